//! Cascading resolution of a node path into its effective properties.
//!
//! Resolving `org/team/web` reads `org.yaml`, `org/team.yaml` and `org/team/web.yaml` in that
//! order.  Every document on the chain must exist; mapping documents contribute their top-level
//! keys, anything else (an empty file, a scalar, a list) is passed over.

use std::path::PathBuf;

use serde_json::value::Value as JsonValue;
use serde_json::Map;

use crate::document::DocumentStore;
use crate::error::{Error, Result};
use crate::path::NodePath;

/// Top-level key/value pairs of a resolved node.
pub type Properties = Map<String, JsonValue>;

/// How ancestor documents combine during resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MergeMode {
    /// Shallow merge; keys of deeper documents overwrite those of shallower ones.
    #[default]
    Merge,
    /// Keep only the deepest mapping document on the chain.
    Replace,
}

/// The deepest ancestor whose own document defines a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ancestor {
    pub node: NodePath,
    pub file: PathBuf,
}

#[derive(Clone, Debug)]
pub struct PathResolver {
    documents: DocumentStore,
}

/// Shallow-merge `overlay` into `base`, overlay winning on collisions.
pub fn merge_into(base: &mut Properties, overlay: Properties) {
    for (key, value) in overlay {
        base.insert(key, value);
    }
}

impl PathResolver {
    pub fn new(documents: DocumentStore) -> Self {
        Self { documents }
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn resolve(&self, path: &NodePath, mode: MergeMode) -> Result<Properties> {
        tracing::debug!("Start reading {:?}", path.segments);

        let mut properties = Properties::new();
        for ancestor in path.ancestors() {
            if let JsonValue::Object(own) = self.documents.load(&ancestor)? {
                match mode {
                    MergeMode::Merge => merge_into(&mut properties, own),
                    MergeMode::Replace => properties = own,
                }
            }
        }

        Ok(properties)
    }

    /// Value of `key` in the merged properties of `path`.
    pub fn property(&self, path: &NodePath, key: &str) -> Result<JsonValue> {
        let mut properties = self.resolve(path, MergeMode::Merge)?;
        properties.remove(key).ok_or_else(|| Error::KeyNotFound {
            path: path.to_string(),
            key: key.to_string(),
        })
    }

    /// Find the deepest ancestor of `path` (inclusive) whose own document defines `key`.
    ///
    /// Only each step's own document is inspected, so a key inherited from a shallower ancestor
    /// is attributed to that ancestor.
    pub fn relevant_ancestor(&self, path: &NodePath, key: &str) -> Result<Ancestor> {
        let mut relevant = None;
        for ancestor in path.ancestors() {
            let own = self.documents.load(&ancestor)?;
            if own.as_object().is_some_and(|map| map.contains_key(key)) {
                relevant = Some(ancestor);
            }
        }

        let node = relevant.ok_or_else(|| Error::KeyNotFound {
            path: path.to_string(),
            key: key.to_string(),
        })?;
        let file = self
            .documents
            .document_path(&node)
            .ok_or_else(|| Error::internal(format!("Node {} has no document path", node)))?;

        Ok(Ancestor { node, file })
    }
}
