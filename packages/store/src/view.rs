//! Views compose several node paths into one answer.
//!
//! A view is a mapping with a single verb key:
//!
//! ```yaml
//! list:            # {path: properties, ...}
//!   - org/team/web
//!   - org/team/db
//! ```
//!
//! ```yaml
//! merge:           # properties of every path folded together, later paths winning
//!   - defaults
//!   - org/team/web
//! ```
//!
//! Views live as documents in the views directory, or arrive inline as a JSON request body.

use std::path;

use serde::Serialize;
use serde_json::value::Value as JsonValue;
use serde_json::Map;

use crate::document::{self, LoadError, DOCUMENT_EXTENSION};
use crate::error::{Error, Result};
use crate::path::NodePath;
use crate::resolver::{merge_into, MergeMode, PathResolver, Properties};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewVerb {
    List,
    Merge,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct View {
    pub verb: ViewVerb,
    pub paths: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ViewResult {
    List(Map<String, JsonValue>),
    Merge(Properties),
}

impl View {
    pub fn from_value(value: JsonValue) -> Result<View> {
        let JsonValue::Object(map) = value else {
            return Err(Error::bad_request("A view must be a mapping"));
        };
        if map.len() != 1 {
            return Err(Error::bad_request(format!(
                "A view needs exactly one verb, found {}",
                map.len()
            )));
        }
        let Some((verb, paths)) = map.into_iter().next() else {
            return Err(Error::bad_request("A view needs exactly one verb"));
        };

        let verb = match verb.as_str() {
            "list" => ViewVerb::List,
            "merge" => ViewVerb::Merge,
            _ => return Err(Error::UnsupportedViewType { verb }),
        };

        let paths = match paths {
            JsonValue::Array(entries) => entries
                .into_iter()
                .map(|entry| match entry {
                    JsonValue::String(path) => Ok(path),
                    other => Err(Error::bad_request(format!(
                        "View entries must be paths, got {}",
                        other
                    ))),
                })
                .collect::<Result<Vec<String>>>()?,
            other => {
                return Err(Error::bad_request(format!(
                    "View verb expects a list of paths, got {}",
                    other
                )))
            }
        };

        Ok(View { verb, paths })
    }
}

#[derive(Clone, Debug)]
pub struct ViewEngine {
    resolver: PathResolver,
    views: path::PathBuf,
}

impl ViewEngine {
    pub fn new(resolver: PathResolver, views: path::PathBuf) -> Self {
        Self { resolver, views }
    }

    fn persisted_view_file(&self, name: &str) -> Option<path::PathBuf> {
        let name = name.trim();
        let name = name
            .strip_suffix(&format!(".{}", DOCUMENT_EXTENSION))
            .unwrap_or(name);
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return None;
        }
        let file = self.views.join(format!("{}.{}", name, DOCUMENT_EXTENSION));
        file.is_file().then_some(file)
    }

    /// Turn `source` into a view: a persisted view name first, then a literal JSON payload.
    pub fn load(&self, source: &str) -> Result<View> {
        let value = match self.persisted_view_file(source) {
            Some(file) => document::load_file(&file).map_err(|err| match err {
                LoadError::Missing(file) => Error::NotFound {
                    path: source.to_string(),
                    file,
                },
                LoadError::Unparsable { file, message } => Error::Malformed {
                    path: source.to_string(),
                    file,
                    message,
                },
            })?,
            None => serde_json::from_str(source).map_err(|err| {
                tracing::debug!("{}", err);
                Error::bad_request(format!("Can not parse your view data: {}", source))
            })?,
        };

        View::from_value(value)
    }

    pub fn evaluate(&self, source: &str) -> Result<ViewResult> {
        let view = self.load(source)?;
        self.evaluate_view(&view)
    }

    pub fn evaluate_view(&self, view: &View) -> Result<ViewResult> {
        match view.verb {
            ViewVerb::List => {
                let mut listed = Map::new();
                for path in &view.paths {
                    let resolved = self
                        .resolver
                        .resolve(&NodePath::parse(path)?, MergeMode::Merge)?;
                    listed.insert(path.clone(), JsonValue::Object(resolved));
                }
                Ok(ViewResult::List(listed))
            }
            ViewVerb::Merge => {
                let mut merged = Properties::new();
                for path in &view.paths {
                    let resolved = self
                        .resolver
                        .resolve(&NodePath::parse(path)?, MergeMode::Merge)?;
                    merge_into(&mut merged, resolved);
                }
                Ok(ViewResult::Merge(merged))
            }
        }
    }
}
