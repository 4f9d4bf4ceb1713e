use std::path::PathBuf;

use serde_json::value::Value as JsonValue;

use pita_store::document;

use crate::error::{Error, Result};

/// `path -> action`: when the store-relative file `path` changes, run `action`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackRule {
    pub path: String,
    pub action: String,
}

/// Source of the callback table consulted for every change notification.
pub trait RuleProvider: Send + Sync {
    fn rules(&self) -> Result<Vec<CallbackRule>>;
}

/// Reads the callback table from its YAML document on every call.
///
/// ```yaml
/// /org/team.yaml: /usr/local/bin/reload-team --quiet
/// /org/web.yaml: http://deploy.local/hooks/web
/// ```
#[derive(Clone, Debug)]
pub struct DocumentRuleProvider {
    file: PathBuf,
}

impl DocumentRuleProvider {
    pub fn new(file: PathBuf) -> Self {
        Self { file }
    }
}

impl RuleProvider for DocumentRuleProvider {
    fn rules(&self) -> Result<Vec<CallbackRule>> {
        let table = document::load_file(&self.file).map_err(|err| Error::Rules {
            file: self.file.clone(),
            message: err.to_string(),
        })?;

        match table {
            JsonValue::Null => Ok(Vec::new()),
            JsonValue::Object(map) => Ok(map
                .into_iter()
                .filter_map(|(path, action)| match action {
                    JsonValue::String(action) => Some(CallbackRule { path, action }),
                    other => {
                        tracing::warn!("Ignoring callback for {}: {} is not a command", path, other);
                        None
                    }
                })
                .collect()),
            other => Err(Error::Rules {
                file: self.file.clone(),
                message: format!("expected a mapping, got {}", other),
            }),
        }
    }
}

/// A fixed table, for embedding and tests.
impl RuleProvider for Vec<CallbackRule> {
    fn rules(&self) -> Result<Vec<CallbackRule>> {
        Ok(self.clone())
    }
}
