use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::action::{Action, ActionExecutor};
use crate::rules::RuleProvider;

/// Result of one fired action, delivered once it completes, fails or times out.
#[derive(Clone, Debug)]
pub struct ActionReport {
    pub rule_path: String,
    pub action: Action,
    pub result: Result<String, String>,
}

/// Matches change notifications against the callback table and fires the actions.
///
/// Actions run detached on the tokio runtime, each bounded by `timeout`; their outcomes arrive
/// on the report channel returned from [`CallbackDispatcher::new`].
pub struct CallbackDispatcher {
    root: PathBuf,
    rules: Arc<dyn RuleProvider>,
    executor: Arc<dyn ActionExecutor>,
    timeout: Duration,
    reports: mpsc::UnboundedSender<ActionReport>,
}

impl CallbackDispatcher {
    pub fn new(
        root: PathBuf,
        rules: Arc<dyn RuleProvider>,
        executor: Arc<dyn ActionExecutor>,
        timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<ActionReport>) {
        let (reports, receiver) = mpsc::unbounded_channel();
        (
            Self {
                root,
                rules,
                executor,
                timeout,
                reports,
            },
            receiver,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `changed` relative to the store root, slash-led: `<root>/org/team.yaml` is
    /// `/org/team.yaml`.  `None` for paths outside the root.
    pub fn relative_path(&self, changed: &Path) -> Option<String> {
        let relative = changed.strip_prefix(&self.root).ok()?;
        let mut normalized = String::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    normalized.push('/');
                    normalized.push_str(&part.to_string_lossy());
                }
                _ => return None,
            }
        }
        Some(normalized)
    }

    /// Fire every action whose rule path equals the changed file, returning what was fired.
    ///
    /// Reading the rule table and resolving programs runs on the blocking pool.  Never waits for
    /// the actions themselves.
    pub async fn dispatch(&self, changed: &Path) -> Vec<Action> {
        let Some(relative) = self.relative_path(changed) else {
            tracing::debug!("Ignoring change outside the store: {}", changed.display());
            return Vec::new();
        };
        tracing::debug!("{} changed! Evaluate callbacks.", relative);

        let rules = Arc::clone(&self.rules);
        let target = relative.clone();
        let matched = tokio::task::spawn_blocking(move || {
            rules.rules().map(|rules| {
                rules
                    .into_iter()
                    .filter(|rule| rule.path == target)
                    .map(|rule| {
                        let action = Action::classify(&rule.action);
                        (rule.path, action)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .await;

        let matched = match matched {
            Ok(Ok(matched)) => matched,
            Ok(Err(err)) => {
                tracing::error!("Can not evaluate callbacks for {}: {}", relative, err);
                return Vec::new();
            }
            Err(err) => {
                tracing::error!("Callback lookup for {} failed: {}", relative, err);
                return Vec::new();
            }
        };

        matched
            .into_iter()
            .map(|(rule_path, action)| {
                tracing::info!("Callback triggered for {}. Will {}", rule_path, action);
                self.fire(rule_path, action.clone());
                action
            })
            .collect()
    }

    fn fire(&self, rule_path: String, action: Action) {
        let executor = Arc::clone(&self.executor);
        let reports = self.reports.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, executor.execute(&action)).await {
                Ok(result) => result,
                Err(_) => Err(format!("timed out after {:?}", timeout)),
            };
            // Nobody listening for reports is fine.
            let _ = reports.send(ActionReport {
                rule_path,
                action,
                result,
            });
        });
    }
}

/// Drain the report channel into the log.
pub async fn log_reports(mut reports: mpsc::UnboundedReceiver<ActionReport>) {
    while let Some(report) = reports.recv().await {
        match report.result {
            Ok(summary) => tracing::info!("{} ({})", summary, report.rule_path),
            Err(message) => {
                match &report.action {
                    Action::Command { line, .. } => tracing::error!("Can not run command {}", line),
                    Action::Request { url } => tracing::error!("Can not request url {}", url),
                }
                tracing::debug!("{}", message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::mock::RecordingExecutor;
    use crate::rules::CallbackRule;

    fn dispatcher(
        rules: Vec<CallbackRule>,
        executor: RecordingExecutor,
        timeout: Duration,
    ) -> (CallbackDispatcher, mpsc::UnboundedReceiver<ActionReport>) {
        CallbackDispatcher::new(
            PathBuf::from("/srv/db"),
            Arc::new(rules),
            Arc::new(executor),
            timeout,
        )
    }

    fn rule(path: &str, action: &str) -> CallbackRule {
        CallbackRule {
            path: path.to_string(),
            action: action.to_string(),
        }
    }

    #[test]
    fn relative_paths_keep_the_leading_slash() {
        let (dispatcher, _) = dispatcher(vec![], RecordingExecutor::new(), Duration::from_secs(1));
        assert_eq!(
            dispatcher.relative_path(Path::new("/srv/db/org/team.yaml")),
            Some("/org/team.yaml".to_string())
        );
        assert_eq!(dispatcher.relative_path(Path::new("/srv/other.yaml")), None);
    }

    #[tokio::test]
    async fn only_exact_matches_fire() {
        let executor = RecordingExecutor::new();
        let (dispatcher, mut reports) = dispatcher(
            vec![
                rule("/org.yaml", "http://localhost/org"),
                rule("/org", "http://localhost/prefix"),
                rule("/org/team.yaml", "http://localhost/team"),
            ],
            executor.clone(),
            Duration::from_secs(5),
        );

        let fired = dispatcher.dispatch(Path::new("/srv/db/org.yaml")).await;
        assert_eq!(
            fired,
            vec![Action::Request {
                url: "http://localhost/org".to_string()
            }]
        );

        let report = reports.recv().await.unwrap();
        assert_eq!(report.rule_path, "/org.yaml");
        assert_eq!(report.result, Ok("recorded".to_string()));
        assert_eq!(executor.executed().len(), 1);

        assert!(dispatcher
            .dispatch(Path::new("/srv/db/org/web.yaml"))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn slow_actions_time_out_without_blocking_dispatch() {
        let executor = RecordingExecutor::slow(Duration::from_secs(60));
        let (dispatcher, mut reports) = dispatcher(
            vec![rule("/org.yaml", "http://localhost/org")],
            executor,
            Duration::from_millis(50),
        );

        // Both notifications dispatch immediately even though no action has completed.
        for _ in 0..2 {
            let fired = dispatcher.dispatch(Path::new("/srv/db/org.yaml")).await;
            assert_eq!(fired.len(), 1);
        }

        for _ in 0..2 {
            let report = reports.recv().await.unwrap();
            assert!(report.result.unwrap_err().contains("timed out"));
        }
    }

    #[tokio::test]
    async fn failures_are_reported_not_raised() {
        let (dispatcher, mut reports) = dispatcher(
            vec![rule("/org.yaml", "http://localhost/org")],
            RecordingExecutor::failing("connection refused"),
            Duration::from_secs(5),
        );

        dispatcher.dispatch(Path::new("/srv/db/org.yaml")).await;
        let report = reports.recv().await.unwrap();
        assert_eq!(report.result, Err("connection refused".to_string()));
    }
}
