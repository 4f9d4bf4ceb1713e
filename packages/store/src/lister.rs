use std::path;

use serde::Serialize;

use crate::document::{DocumentStore, DOCUMENT_EXTENSION};
use crate::error::{Error, Result};
use crate::path::NodePath;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    Directory,
    File,
    View,
}

/// One line of a listing: a node (or view) name, what it is and where to fetch it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub url: String,
}

/// A directory lists its children, a leaf lists itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum NodeListing {
    Children(Vec<Entry>),
    Leaf(Entry),
}

#[derive(Clone, Debug)]
pub struct NodeLister {
    documents: DocumentStore,
    views: path::PathBuf,
    base_url: String,
}

fn document_names(dir: &path::Path) -> Vec<String> {
    let mut names: Vec<String> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext == DOCUMENT_EXTENSION)
        })
        .filter_map(|entry| {
            entry
                .path()
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_owned)
        })
        .collect();
    names.sort();
    names
}

impl NodeLister {
    /// `base_url` prefixes every generated URL; pass an empty string for root-relative URLs.
    pub fn new(documents: DocumentStore, views: path::PathBuf, base_url: &str) -> Self {
        Self {
            documents,
            views,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, parts: &[&str]) -> String {
        let tail = parts
            .iter()
            .flat_map(|part| part.split('/'))
            .filter(|s| !s.is_empty())
            .collect::<Vec<&str>>()
            .join("/");
        format!("{}/{}", self.base_url, tail)
    }

    pub fn list(&self, path: &NodePath) -> Result<NodeListing> {
        let dir = self.documents.directory_path(path);
        let node = path.to_string();

        if dir.is_dir() {
            let children = document_names(&dir)
                .into_iter()
                .map(|name| {
                    let kind = if dir.join(&name).is_dir() {
                        EntryKind::Directory
                    } else {
                        EntryKind::File
                    };
                    let url = self.url(&["properties", &node, &name]);
                    Entry { name, kind, url }
                })
                .collect();
            return Ok(NodeListing::Children(children));
        }

        if let (Some(name), true) = (path.name(), self.documents.has_document(path)) {
            return Ok(NodeListing::Leaf(Entry {
                name: name.to_string(),
                kind: EntryKind::File,
                url: self.url(&["properties", &node, "eachpair"]),
            }));
        }

        Err(Error::NotFound {
            path: node,
            file: dir,
        })
    }

    pub fn list_views(&self) -> Result<Vec<Entry>> {
        if !self.views.is_dir() {
            return Err(Error::NotFound {
                path: String::new(),
                file: self.views.clone(),
            });
        }

        Ok(document_names(&self.views)
            .into_iter()
            .map(|name| {
                let url = self.url(&["view", &name]);
                Entry {
                    name,
                    kind: EntryKind::View,
                    url,
                }
            })
            .collect())
    }
}
