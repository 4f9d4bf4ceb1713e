//! # pita-store
//!
//! A hierarchical property store kept as YAML documents on disk.
//!
//! Every directory under the store root is a node; the document `<node>.yaml` beside it holds
//! that node's properties.  Reading a node cascades: the properties of every ancestor are merged
//! into the node's own, deeper keys winning.
//!
//! ```text
//! db/
//!     org.yaml            a: 1
//!     org/
//!         team.yaml       b: 2
//! ```
//!
//! resolves `org/team` to `{a: 1, b: 2}`.
//!
//! - [`PathResolver`] merges ancestor chains and finds which ancestor defines a key.
//! - [`NodeLister`] lists the children of a node, or the views directory.
//! - [`ViewEngine`] evaluates `list`/`merge` views over several paths.
//! - [`WriteCoordinator`] creates nodes and updates or deletes keys transactionally.

pub mod document;
pub mod error;
pub mod lister;
pub mod path;
pub mod resolver;
pub mod view;
pub mod writer;

pub use document::{DocumentStore, LoadError, DOCUMENT_EXTENSION};
pub use error::{Error, ErrorKind, Result};
pub use lister::{Entry, EntryKind, NodeLister, NodeListing};
pub use path::{NodePath, PathError};
pub use resolver::{Ancestor, MergeMode, PathResolver, Properties};
pub use view::{View, ViewEngine, ViewResult, ViewVerb};
pub use writer::{DeleteOutcome, StepOutcome, WriteCoordinator};
