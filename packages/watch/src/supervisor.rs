//! Lifecycle of the store watcher.
//!
//! ```text
//! Idle --ready--> Starting --guard won--> Watching
//!                     \
//!                      --guard lost--> Aborted
//! ```
//!
//! `Watching` lasts for the rest of the process.  The guard makes sure that, however many
//! supervisors get started against one store root, only one of them consumes notifications.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::dispatcher::CallbackDispatcher;
use crate::error::Result;
use crate::guard::StartGuard;

const MAX_USER_WATCHES: &str = "/proc/sys/fs/inotify/max_user_watches";
const RECOMMENDED_MAX_USER_WATCHES: u64 = 5000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Starting,
    Watching,
    Aborted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Modified,
    Other,
}

/// "File `path` changed", as delivered by the notification source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Modified,
        }
    }
}

/// One finished write yields exactly one `Modified`.
///
/// A rename into place counts through its `To` half only; the `From` and `Both` reports of the
/// same rename are ignored.  inotify reports an in-place write as one or more data changes
/// (truncate, then every `write`) followed by a single close-after-write, so on Linux only the
/// close counts.  Other backends have no close event and report data changes instead.
fn change_kind(kind: &EventKind) -> ChangeKind {
    match kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Modified,
        EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Other,
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => ChangeKind::Modified,
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
            if !cfg!(target_os = "linux") =>
        {
            ChangeKind::Modified
        }
        _ => ChangeKind::Other,
    }
}

/// Keeps the filesystem watch registered and owns the dispatch loop.
///
/// Dropping the handle unregisters the watch; the loop then ends once queued events drain.
pub struct WatchHandle {
    _watcher: notify::RecommendedWatcher,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub struct WatcherSupervisor {
    guard: Arc<StartGuard>,
    dispatcher: Arc<CallbackDispatcher>,
    state: WatchState,
}

fn hint_max_user_watches() {
    let Ok(contents) = fs::read_to_string(MAX_USER_WATCHES) else {
        return;
    };
    if let Ok(limit) = contents.trim().parse::<u64>() {
        if limit < RECOMMENDED_MAX_USER_WATCHES {
            tracing::info!(
                "You should increase fs.inotify.max_user_watches to at least {}",
                RECOMMENDED_MAX_USER_WATCHES
            );
        }
    }
}

async fn run_loop(
    dispatcher: Arc<CallbackDispatcher>,
    mut events: mpsc::UnboundedReceiver<ChangeEvent>,
) {
    while let Some(event) = events.recv().await {
        if event.kind == ChangeKind::Modified {
            dispatcher.dispatch(&event.path).await;
        }
    }
    tracing::warn!(
        "Change notifications for {} stopped",
        dispatcher.root().display()
    );
}

impl WatcherSupervisor {
    pub fn new(guard: Arc<StartGuard>, dispatcher: Arc<CallbackDispatcher>) -> Self {
        Self {
            guard,
            dispatcher,
            state: WatchState::Idle,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    fn acquire(&mut self) -> bool {
        self.state = WatchState::Starting;
        if self.guard.try_acquire() {
            return true;
        }

        tracing::warn!(
            "A watcher for {} is already running; not starting another",
            self.dispatcher.root().display()
        );
        self.state = WatchState::Aborted;
        false
    }

    /// Start consuming `events` from an arbitrary notification source.
    ///
    /// Returns `None`, without touching `events`, when another supervisor already owns the root.
    pub fn start_with(
        &mut self,
        events: mpsc::UnboundedReceiver<ChangeEvent>,
    ) -> Option<JoinHandle<()>> {
        if !self.acquire() {
            return None;
        }

        self.state = WatchState::Watching;
        Some(tokio::spawn(run_loop(Arc::clone(&self.dispatcher), events)))
    }

    /// Watch the store root recursively and dispatch every modification.
    ///
    /// Call once the server is ready.  `Ok(None)` means another supervisor already owns the root.
    pub fn start(&mut self) -> Result<Option<WatchHandle>> {
        if !self.acquire() {
            return Ok(None);
        }

        hint_max_user_watches();

        let root = self.dispatcher.root().to_path_buf();
        let (tx, rx) = mpsc::unbounded_channel::<ChangeEvent>();
        let mut watcher = notify::RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    let kind = change_kind(&event.kind);
                    for path in event.paths {
                        let _ = tx.send(ChangeEvent { path, kind });
                    }
                }
                Err(e) => tracing::error!("Filesystem watcher error: {}", e),
            },
            notify::Config::default(),
        )
        .inspect_err(|_| self.state = WatchState::Aborted)?;

        if let Err(e) = watcher.watch(&root, RecursiveMode::Recursive) {
            self.state = WatchState::Aborted;
            return Err(e.into());
        }
        tracing::info!("Observe {} for changes.", root.display());

        self.state = WatchState::Watching;
        let task = tokio::spawn(run_loop(Arc::clone(&self.dispatcher), rx));
        Ok(Some(WatchHandle {
            _watcher: watcher,
            task,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind};

    #[test]
    fn renames_count_through_their_target_only() {
        assert_eq!(
            change_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            ChangeKind::Modified
        );
        assert_eq!(
            change_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            ChangeKind::Other
        );
        assert_eq!(
            change_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            ChangeKind::Other
        );
    }

    #[test]
    fn finished_writes_count_once() {
        assert_eq!(
            change_kind(&EventKind::Access(AccessKind::Close(AccessMode::Write))),
            ChangeKind::Modified
        );
        assert_eq!(
            change_kind(&EventKind::Create(CreateKind::File)),
            ChangeKind::Other
        );
        assert_eq!(
            change_kind(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))),
            ChangeKind::Other
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn inotify_data_changes_wait_for_the_close() {
        assert_eq!(
            change_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Any))),
            ChangeKind::Other
        );
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn data_changes_count_without_close_events() {
        assert_eq!(
            change_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Any))),
            ChangeKind::Modified
        );
    }
}
