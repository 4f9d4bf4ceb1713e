use std::sync::Arc;

use pita_watch::{
    log_reports, CallbackDispatcher, DocumentRuleProvider, StartGuard, SystemExecutor,
    WatchHandle, WatcherSupervisor,
};

use crate::config::Config;
use crate::state::AppState;

/// Start the callback watcher for the store root once the listener is bound.
///
/// Watcher failures are logged and leave the HTTP side running.  `None` also covers the case
/// where a watcher for this root is already active in the process.
pub fn start(config: &Config, state: &AppState) -> Option<WatchHandle> {
    let executor = match SystemExecutor::new(config.action_timeout()) {
        Ok(executor) => executor,
        Err(e) => {
            tracing::error!("Can not build the callback executor: {}", e);
            return None;
        }
    };
    let rules = DocumentRuleProvider::new(config.callback_file.clone());

    let (dispatcher, reports) = CallbackDispatcher::new(
        state.root().to_path_buf(),
        Arc::new(rules),
        Arc::new(executor),
        config.action_timeout(),
    );
    tokio::spawn(log_reports(reports));

    let mut supervisor =
        WatcherSupervisor::new(StartGuard::for_root(state.root()), Arc::new(dispatcher));
    match supervisor.start() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Can not watch {}: {}", state.root().display(), e);
            None
        }
    }
}
