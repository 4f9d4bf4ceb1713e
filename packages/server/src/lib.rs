//! # pita-server
//!
//! HTTP front end for [`pita_store`], plus the process glue: configuration, logging and the
//! callback watcher from [`pita_watch`].
//!
//! Every response is JSON.  Failures use the envelope `{"status": 2, "error_message": ...}`,
//! successful writes `{"status": 0, ...}`.

pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod state;
pub mod watcher;

pub use config::{Args, Config, ConfigError};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
