use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use pita_store::{ErrorKind, PathError};

/// Failure of a request, rendered as `{"status": 2, "error_message": ...}`.
#[derive(thiserror::Error, Debug)]
#[error("{message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn no_route() -> Self {
        Self::not_found("Request doesn't match a valid route")
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        // Unparsable documents are reported like missing ones.
        ErrorKind::NotFound | ErrorKind::Malformed => StatusCode::NOT_FOUND,
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::UnsupportedViewType => StatusCode::NOT_ACCEPTABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<pita_store::Error> for ApiError {
    fn from(err: pita_store::Error) -> Self {
        Self::new(status_for(err.kind()), err.to_string())
    }
}

impl From<PathError> for ApiError {
    fn from(err: PathError) -> Self {
        pita_store::Error::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{}", self.message);
        } else {
            tracing::warn!("{}", self.message);
        }

        let body = json!({
            "status": 2,
            "error_message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}
