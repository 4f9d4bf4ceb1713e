use std::{fs, io, path};

use serde_json::value::Value as JsonValue;

use crate::error::{Error, Result};
use crate::path::NodePath;

/// Extension of every document file in the store, the views directory and the callback table.
pub const DOCUMENT_EXTENSION: &str = "yaml";

/// Why a single document could not be loaded.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("File not found: {}", .0.display())]
    Missing(path::PathBuf),
    #[error("Document {} not parsable: {message}", file.display())]
    Unparsable { file: path::PathBuf, message: String },
}

/// Loads and persists the YAML documents backing the property tree.
///
/// The store owns nothing beyond its root directory: every call goes back to the filesystem.
/// A node `a/b` is backed by the directory `<root>/a/b` and the document `<root>/a/b.yaml`.
#[derive(Clone, Debug)]
pub struct DocumentStore {
    root: path::PathBuf,
}

impl DocumentStore {
    pub fn new(root: path::PathBuf) -> Result<DocumentStore> {
        let attr = fs::metadata(&root).map_err(|error| {
            Error::internal(format!(
                "Store root {} is not accessible: {}",
                root.display(),
                error
            ))
        })?;

        if !attr.is_dir() {
            return Err(Error::internal(format!(
                "Store root {} must be a directory",
                root.display()
            )));
        }

        match root.canonicalize() {
            Ok(root) => Ok(DocumentStore { root }),
            Err(error) => Err(Error::internal(format!(
                "Store root {} can not be canonicalized: {}",
                root.display(),
                error
            ))),
        }
    }

    pub fn root(&self) -> &path::Path {
        &self.root
    }

    /// Directory that holds the children of `node`.
    pub fn directory_path(&self, node: &NodePath) -> path::PathBuf {
        let mut dir = self.root.clone();
        dir.extend(node.iter());
        dir
    }

    /// File holding the document of `node`.  The root has no document of its own.
    pub fn document_path(&self, node: &NodePath) -> Option<path::PathBuf> {
        let name = node.name()?;
        let mut file = self.directory_path(node);
        file.set_file_name(format!("{}.{}", name, DOCUMENT_EXTENSION));
        Some(file)
    }

    pub fn has_document(&self, node: &NodePath) -> bool {
        self.document_path(node).is_some_and(|file| file.is_file())
    }

    /// Load the document of `node`, distinguishing a missing file from unparsable content.
    pub fn load(&self, node: &NodePath) -> Result<JsonValue> {
        let Some(file) = self.document_path(node) else {
            return Err(Error::NotFound {
                path: node.to_string(),
                file: self.root.clone(),
            });
        };

        load_file(&file).map_err(|err| match err {
            LoadError::Missing(file) => Error::NotFound {
                path: node.to_string(),
                file,
            },
            LoadError::Unparsable { file, message } => Error::Malformed {
                path: node.to_string(),
                file,
                message,
            },
        })
    }
}

/// Parse one document file.
///
/// An empty file parses to `null`, which callers treat as a document without properties.
pub fn load_file(file: &path::Path) -> Result<JsonValue, LoadError> {
    tracing::debug!("Reading {}...", file.display());
    if !file.is_file() {
        return Err(LoadError::Missing(file.to_path_buf()));
    }

    let contents = fs::read_to_string(file).map_err(|err| LoadError::Unparsable {
        file: file.to_path_buf(),
        message: err.to_string(),
    })?;

    serde_yaml::from_str(&contents).map_err(|err| {
        tracing::error!("YAML parsing in {}", file.display());
        tracing::debug!("{}", err);
        LoadError::Unparsable {
            file: file.to_path_buf(),
            message: err.to_string(),
        }
    })
}

/// Write `value` to `file` so that readers see either the old or the new document, never a
/// partially written one.
pub fn persist(file: &path::Path, value: &JsonValue) -> io::Result<()> {
    use io::Write;

    let serialized = serde_yaml::to_string(value).map_err(io::Error::other)?;
    let parent = file
        .parent()
        .ok_or_else(|| io::Error::other(format!("{} has no parent", file.display())))?;

    let mut staged = tempfile::NamedTempFile::new_in(parent)?;
    staged.write_all(serialized.as_bytes())?;
    staged.as_file().sync_all()?;
    // Close before the rename so the only event on `file` is the rename itself.
    let staged = staged.into_temp_path();
    staged.persist(file).map_err(|err| err.error)?;
    Ok(())
}

/// Create `file` holding an empty mapping unless it already exists.
///
/// Returns `true` when the file was created by this call.
pub fn create_empty(file: &path::Path) -> io::Result<bool> {
    use io::Write;

    match fs::OpenOptions::new().write(true).create_new(true).open(file) {
        Ok(mut f) => {
            f.write_all(b"{}\n")?;
            f.sync_all()?;
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(err),
    }
}
