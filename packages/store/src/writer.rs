//! The only code path that mutates documents.
//!
//! Every read-modify-write of a document runs as a transaction: the per-file lock is held from
//! load to rename, and the new content is staged in a sibling temp file, so concurrent writers
//! can not lose each other's keys and readers never see a half-written document.

use std::collections::HashMap;
use std::fs;
use std::path::{Path as FsPath, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::value::Value as JsonValue;

use crate::document::{self, DocumentStore, LoadError};
use crate::error::{Error, Result};
use crate::path::NodePath;
use crate::resolver::{PathResolver, Properties};

/// What `create_node` did for one prefix of the requested path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Created { path: String },
    Existing { path: String },
    Failed { path: String, message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    Removed { file: PathBuf },
    Failed { file: PathBuf, message: String },
}

/// Per-document locks, held only while some transaction uses them.
///
/// An entry lives as long as a transaction holds or waits for it, so the table never grows past
/// the number of documents being written at once.
#[derive(Debug, Default)]
struct FileLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FileLocks {
    fn for_file(&self, file: &FsPath) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(file.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Hand back a lock from [`FileLocks::for_file`], dropping the entry once nobody else has it.
    fn release(&self, file: &FsPath, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(lock);
        if locks
            .get(file)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(file);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[derive(Debug)]
pub struct WriteCoordinator {
    resolver: PathResolver,
    locks: FileLocks,
}

impl WriteCoordinator {
    pub fn new(resolver: PathResolver) -> Self {
        Self {
            resolver,
            locks: FileLocks::default(),
        }
    }

    fn documents(&self) -> &DocumentStore {
        self.resolver.documents()
    }

    /// Run `apply` against the mapping stored in `file` and persist the result.
    ///
    /// An empty document counts as an empty mapping; any other non-mapping content is refused.
    pub fn transaction<R>(
        &self,
        file: &FsPath,
        apply: impl FnOnce(&mut Properties) -> R,
    ) -> Result<R> {
        let lock = self.locks.for_file(file);
        let result = {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Self::apply_locked(file, apply)
        };
        self.locks.release(file, lock);
        result
    }

    fn apply_locked<R>(file: &FsPath, apply: impl FnOnce(&mut Properties) -> R) -> Result<R> {
        let mut properties = match document::load_file(file) {
            Ok(JsonValue::Object(map)) => map,
            Ok(JsonValue::Null) => Properties::new(),
            Ok(_) | Err(LoadError::Unparsable { .. }) => {
                return Err(Error::internal(format!(
                    "Not a valid YAML {}",
                    file.display()
                )))
            }
            Err(LoadError::Missing(file)) => {
                return Err(Error::internal(format!(
                    "Document {} disappeared",
                    file.display()
                )))
            }
        };

        let result = apply(&mut properties);

        document::persist(file, &JsonValue::Object(properties)).map_err(|err| {
            Error::internal(format!(
                "Can write to YAML file {}: {}",
                file.display(),
                err
            ))
        })?;

        Ok(result)
    }

    /// Make sure every prefix of `path` exists as a directory with a document.
    ///
    /// Existing documents are left untouched, so calling this twice is harmless.  A failing step
    /// is logged and reported, and the walk carries on with the next prefix.
    pub fn create_node(&self, path: &NodePath) -> Vec<StepOutcome> {
        path.ancestors()
            .map(|prefix| {
                let name = prefix.to_string();
                match self.create_step(&prefix) {
                    Ok(true) => StepOutcome::Created { path: name },
                    Ok(false) => StepOutcome::Existing { path: name },
                    Err(err) => {
                        tracing::error!("Can not create {}", name);
                        tracing::debug!("{}", err);
                        StepOutcome::Failed {
                            path: name,
                            message: err.to_string(),
                        }
                    }
                }
            })
            .collect()
    }

    fn create_step(&self, prefix: &NodePath) -> std::io::Result<bool> {
        let dir = self.documents().directory_path(prefix);
        if !dir.is_dir() {
            fs::create_dir_all(&dir)?;
            tracing::info!("Created directory {}", dir.display());
        }

        let file = self
            .documents()
            .document_path(prefix)
            .ok_or_else(|| std::io::Error::other("the root has no document"))?;
        let created = document::create_empty(&file)?;
        if created {
            tracing::info!("Created file {}", file.display());
        }
        Ok(created)
    }

    /// Upsert every top-level key of `patch` into the document of `path`.
    pub fn update_node(&self, path: &NodePath, patch: &JsonValue) -> Result<()> {
        let JsonValue::Object(patch) = patch else {
            return Err(Error::bad_request("Update payload must be a JSON object"));
        };

        let file = self
            .documents()
            .document_path(path)
            .filter(|file| file.is_file())
            .ok_or_else(|| Error::NotFound {
                path: path.to_string(),
                file: self.documents().directory_path(path),
            })?;

        tracing::info!("Updating {}", file.display());
        self.transaction(&file, |properties| {
            for (key, value) in patch {
                properties.insert(key.clone(), value.clone());
            }
        })
    }

    /// Remove `key` from the deepest ancestor of `path` that defines it.
    ///
    /// Only locating the ancestor can fail; a failing transaction is logged and reported in the
    /// outcome instead.
    pub fn delete_key(&self, path: &NodePath, key: &str) -> Result<DeleteOutcome> {
        let ancestor = self.resolver.relevant_ancestor(path, key)?;
        let file = ancestor.file;

        tracing::info!("Deleting {} from {} in {}", key, path, file.display());
        match self.transaction(&file, |properties| properties.remove(key)) {
            Ok(_) => Ok(DeleteOutcome::Removed { file }),
            Err(err) => {
                tracing::error!("While deleting key {} from {}", key, file.display());
                tracing::debug!("{}", err);
                Ok(DeleteOutcome::Failed {
                    file,
                    message: err.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod write_coordinator_tests {
    use std::thread;

    use serde_json::json;

    use super::*;
    use crate::resolver::MergeMode;

    struct TestStore {
        _dir: tempfile::TempDir,
        writer: WriteCoordinator,
        resolver: PathResolver,
    }

    impl TestStore {
        fn new(files: &[(&str, &str)]) -> TestStore {
            let dir = tempfile::tempdir().unwrap();
            for (name, contents) in files {
                let file = dir.path().join(name);
                fs::create_dir_all(file.parent().unwrap()).unwrap();
                fs::write(file, contents).unwrap();
            }
            let resolver = PathResolver::new(DocumentStore::new(dir.path().to_path_buf()).unwrap());
            TestStore {
                _dir: dir,
                writer: WriteCoordinator::new(resolver.clone()),
                resolver,
            }
        }

        fn own(&self, path: &str) -> JsonValue {
            self.resolver
                .documents()
                .load(&NodePath::parse(path).unwrap())
                .unwrap()
        }
    }

    fn path(path: &str) -> NodePath {
        NodePath::parse(path).unwrap()
    }

    #[test]
    fn create_node_builds_every_prefix() {
        let store = TestStore::new(&[]);
        let steps = store.writer.create_node(&path("org/team/web"));
        assert_eq!(
            steps,
            vec![
                StepOutcome::Created {
                    path: "org".to_string()
                },
                StepOutcome::Created {
                    path: "org/team".to_string()
                },
                StepOutcome::Created {
                    path: "org/team/web".to_string()
                },
            ]
        );
        assert_eq!(store.own("org/team/web"), json!({}));
        assert!(store
            .resolver
            .documents()
            .directory_path(&path("org/team/web"))
            .is_dir());
    }

    #[test]
    fn create_node_is_idempotent() {
        let store = TestStore::new(&[("org.yaml", "a: 1\n")]);
        store.writer.create_node(&path("org/team"));
        store
            .writer
            .update_node(&path("org/team"), &json!({"b": 2}))
            .unwrap();

        let steps = store.writer.create_node(&path("org/team"));
        assert!(steps
            .iter()
            .all(|step| matches!(step, StepOutcome::Existing { .. })));
        assert_eq!(store.own("org"), json!({"a": 1}));
        assert_eq!(store.own("org/team"), json!({"b": 2}));
    }

    #[test]
    fn create_node_reports_failed_steps_and_continues() {
        // A plain file where the `org` directory should be blocks every step below it.
        let store = TestStore::new(&[("org", "not a directory")]);
        let steps = store.writer.create_node(&path("org/team"));
        assert_eq!(steps.len(), 2);
        assert!(matches!(&steps[0], StepOutcome::Failed { path, .. } if path == "org"));
        assert!(matches!(&steps[1], StepOutcome::Failed { path, .. } if path == "org/team"));
    }

    #[test]
    fn update_node_upserts_and_keeps_other_keys() {
        let store = TestStore::new(&[("org.yaml", "a: 1\nb: 2\n")]);
        store
            .writer
            .update_node(&path("org"), &json!({"b": 20, "c": {"deep": true}}))
            .unwrap();

        assert_eq!(store.own("org"), json!({"a": 1, "b": 20, "c": {"deep": true}}));
        assert_eq!(
            store.resolver.property(&path("org"), "c").unwrap(),
            json!({"deep": true})
        );
    }

    #[test]
    fn update_node_requires_the_leaf_document() {
        let store = TestStore::new(&[("org.yaml", "a: 1\n")]);
        assert!(matches!(
            store.writer.update_node(&path("org/team"), &json!({"b": 2})),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            store.writer.update_node(&path("org"), &json!(["b"])),
            Err(Error::BadRequest { .. })
        ));
    }

    #[test]
    fn update_node_refuses_non_mapping_documents() {
        let store = TestStore::new(&[("org.yaml", "- a\n- b\n")]);
        assert!(matches!(
            store.writer.update_node(&path("org"), &json!({"b": 2})),
            Err(Error::Internal { .. })
        ));
        assert_eq!(store.own("org"), json!(["a", "b"]));
    }

    #[test]
    fn update_node_fills_an_empty_document() {
        let store = TestStore::new(&[("org.yaml", "")]);
        store
            .writer
            .update_node(&path("org"), &json!({"a": 1}))
            .unwrap();
        assert_eq!(store.own("org"), json!({"a": 1}));
    }

    #[test]
    fn concurrent_updates_do_not_lose_keys() {
        let store = TestStore::new(&[("org.yaml", "{}\n")]);
        let writer = &store.writer;

        thread::scope(|scope| {
            for i in 0..16 {
                scope.spawn(move || {
                    writer
                        .update_node(&path("org"), &json!({ format!("k{}", i): i }))
                        .unwrap();
                });
            }
        });

        let own = store.own("org");
        let map = own.as_object().unwrap();
        assert_eq!(map.len(), 16);
        for i in 0..16 {
            assert_eq!(map[&format!("k{}", i)], json!(i));
        }
    }

    #[test]
    fn lock_table_empties_after_transactions() {
        let store = TestStore::new(&[("org.yaml", "{}\n"), ("web.yaml", "- a\n")]);
        let writer = &store.writer;

        thread::scope(|scope| {
            for i in 0..8 {
                scope.spawn(move || {
                    writer
                        .update_node(&path("org"), &json!({ format!("k{}", i): i }))
                        .unwrap();
                });
            }
        });
        assert!(writer.update_node(&path("web"), &json!({"a": 1})).is_err());

        assert_eq!(writer.locks.len(), 0);
    }

    #[test]
    fn delete_key_touches_only_the_deepest_definer() {
        let store = TestStore::new(&[
            ("org.yaml", "owner: root\nregion: eu\n"),
            ("org/team.yaml", "owner: team\nsize: 4\n"),
        ]);

        let outcome = store.writer.delete_key(&path("org/team"), "owner").unwrap();
        assert!(matches!(outcome, DeleteOutcome::Removed { ref file } if file.ends_with("org/team.yaml")));
        assert_eq!(store.own("org/team"), json!({"size": 4}));
        assert_eq!(store.own("org"), json!({"owner": "root", "region": "eu"}));

        // The shallower definition shows through afterwards.
        assert_eq!(
            store
                .resolver
                .resolve(&path("org/team"), MergeMode::Merge)
                .unwrap()["owner"],
            json!("root")
        );
    }

    #[test]
    fn delete_missing_key_is_not_found() {
        let store = TestStore::new(&[("org.yaml", "a: 1\n")]);
        assert!(matches!(
            store.writer.delete_key(&path("org"), "b"),
            Err(Error::KeyNotFound { .. })
        ));
    }
}
