//! Callback actions and how they are carried out.
//!
//! An action string is a command line when its first word resolves to an executable file, and a
//! URL to GET otherwise.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use reqwest::Client;

use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Run `line` through the shell; `program` is the resolved first word.
    Command { line: String, program: PathBuf },
    Request { url: String },
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.is_file() && metadata.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        metadata.is_file()
    }
}

/// Resolve the first word of a command line to an executable.
///
/// Words containing a slash are taken as paths; bare words are looked up on `PATH`.
fn resolve_program(word: &str) -> Option<PathBuf> {
    if word.is_empty() {
        return None;
    }
    if word.contains('/') {
        let path = PathBuf::from(word);
        return is_executable(&path).then_some(path);
    }
    which::which(word).ok().filter(|path| is_executable(path))
}

impl Action {
    pub fn classify(action: &str) -> Action {
        let action = action.trim();
        let first = action.split_whitespace().next().unwrap_or_default();
        match resolve_program(first) {
            Some(program) => Action::Command {
                line: action.to_string(),
                program,
            },
            None => Action::Request {
                url: action.to_string(),
            },
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Command { line, .. } => write!(f, "execute {}", line),
            Action::Request { url } => write!(f, "request {}", url),
        }
    }
}

/// Carries out actions.
///
/// Implementations can spawn real processes and send real requests, or record what they were
/// asked to do in tests.  The returned string is a short summary used for logging.
#[async_trait::async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &Action) -> Result<String, String>;
}

/// Production executor: `sh -c` for commands, reqwest for URLs, both bounded by one timeout.
pub struct SystemExecutor {
    client: Client,
    timeout: Duration,
}

impl SystemExecutor {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }

    /// Commands and requests are each cut off after 30 seconds.
    pub fn with_default_timeout() -> Result<Self> {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait::async_trait]
impl ActionExecutor for SystemExecutor {
    async fn execute(&self, action: &Action) -> Result<String, String> {
        match action {
            Action::Command { line, .. } => {
                let mut command = tokio::process::Command::new("sh");
                command
                    .arg("-c")
                    .arg(line)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .kill_on_drop(true);
                // Dropping the future (on timeout) kills the child.
                let status = tokio::time::timeout(self.timeout, command.status())
                    .await
                    .map_err(|_| format!("Command timed out after {:?}", self.timeout))?
                    .map_err(|e| e.to_string())?;
                if status.success() {
                    Ok("Command finished.".to_string())
                } else {
                    Err(format!("Command exited with {}", status))
                }
            }
            Action::Request { url } => {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(format!("Request finished with {}.", response.status()))
            }
        }
    }
}

/// Executor that records actions instead of running them.
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub struct RecordingExecutor {
        executed: Arc<Mutex<Vec<Action>>>,
        fail_with: Option<String>,
        delay: Option<Duration>,
    }

    impl RecordingExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(message: impl Into<String>) -> Self {
            Self {
                fail_with: Some(message.into()),
                ..Self::default()
            }
        }

        pub fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        pub fn executed(&self) -> Vec<Action> {
            self.executed.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ActionExecutor for RecordingExecutor {
        async fn execute(&self, action: &Action) -> Result<String, String> {
            self.executed.lock().unwrap().push(action.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.fail_with {
                Some(message) => Err(message.clone()),
                None => Ok("recorded".to_string()),
            }
        }
    }
}
