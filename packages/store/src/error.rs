use std::path::PathBuf;

use crate::path::PathError;

/// Errors raised by the property store.
///
/// The variants follow the failure kinds the HTTP layer distinguishes; see
/// [`Error::kind`] for the coarse classification it maps onto status codes.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Path(#[from] PathError),

    #[error("Can not read {} in database", file.display())]
    NotFound { path: String, file: PathBuf },

    #[error("Document {} is not parsable: {message}", file.display())]
    Malformed {
        path: String,
        file: PathBuf,
        message: String,
    },

    #[error("Can not find Key {key} in path {path}")]
    KeyNotFound { path: String, key: String },

    #[error("{message}")]
    BadRequest { message: String },

    #[error("View type {verb} is not allowed")]
    UnsupportedViewType { verb: String },

    #[error("{message}")]
    Internal { message: String },
}

/// Coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Malformed,
    BadRequest,
    UnsupportedViewType,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } | Error::KeyNotFound { .. } => ErrorKind::NotFound,
            Error::Malformed { .. } => ErrorKind::Malformed,
            Error::Path(_) | Error::BadRequest { .. } => ErrorKind::BadRequest,
            Error::UnsupportedViewType { .. } => ErrorKind::UnsupportedViewType,
            Error::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest {
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_not_found_is_a_not_found() {
        let e = Error::KeyNotFound {
            path: "org/team".to_string(),
            key: "owner".to_string(),
        };
        assert_eq!(e.kind(), ErrorKind::NotFound);
        assert_eq!(e.to_string(), "Can not find Key owner in path org/team");
    }

    #[test]
    fn path_errors_are_bad_requests() {
        let e: Error = PathError::SegmentInvalid {
            segment: "..".to_string(),
            position: 0,
            message: "relative segments are not allowed".to_string(),
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn malformed_display_names_the_file() {
        let e = Error::Malformed {
            path: "org".to_string(),
            file: PathBuf::from("/db/org.yaml"),
            message: "did not find expected key".to_string(),
        };
        assert_eq!(e.kind(), ErrorKind::Malformed);
        assert!(e.to_string().contains("/db/org.yaml"));
    }
}
