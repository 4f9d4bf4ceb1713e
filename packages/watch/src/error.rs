use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Callback table {} can not be loaded: {message}", file.display())]
    Rules { file: PathBuf, message: String },

    #[error("Filesystem watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
