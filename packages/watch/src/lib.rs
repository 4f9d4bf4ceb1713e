//! # pita-watch
//!
//! Reacts to changes under a store root by firing callbacks.
//!
//! The callback table is a YAML document mapping store-relative file paths to actions:
//!
//! ```yaml
//! /org/team.yaml: /usr/local/bin/reload-team --quiet
//! /org/web.yaml: http://deploy.local/hooks/web
//! ```
//!
//! When `/org/team.yaml` is modified the command runs; when `/org/web.yaml` is modified the URL
//! is fetched.  Matching is exact string equality.  Actions are detached and time-bounded, and
//! their outcomes are only logged.
//!
//! ```ignore
//! let (dispatcher, reports) = CallbackDispatcher::new(root, rules, executor, timeout);
//! tokio::spawn(log_reports(reports));
//! let mut supervisor = WatcherSupervisor::new(StartGuard::for_root(&root), Arc::new(dispatcher));
//! let handle = supervisor.start()?;
//! ```

pub mod action;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod rules;
pub mod supervisor;

pub use action::{Action, ActionExecutor, SystemExecutor};
pub use dispatcher::{log_reports, ActionReport, CallbackDispatcher};
pub use error::{Error, Result};
pub use guard::StartGuard;
pub use rules::{CallbackRule, DocumentRuleProvider, RuleProvider};
pub use supervisor::{ChangeEvent, ChangeKind, WatchHandle, WatchState, WatcherSupervisor};
