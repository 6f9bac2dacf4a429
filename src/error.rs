use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::config::ConfigError;
use crate::db::StoreError;

/// Request-scoped failures of the poll services.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    PreconditionFailed(String),
    #[error("storage conflict, retry the request: {0}")]
    StorageConflict(String),
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl PollError {
    pub fn poll_not_found(poll_id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("Poll {} not found.", poll_id))
    }

    /// Stable machine-readable identifier sent alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            PollError::Validation(_) => "validation_error",
            PollError::NotFound(_) => "not_found",
            PollError::PreconditionFailed(_) => "precondition_failed",
            PollError::StorageConflict(_) => "storage_conflict",
            PollError::StorageFailure(_) => "storage_failure",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PollError::Validation(_) => StatusCode::BAD_REQUEST,
            PollError::NotFound(_) => StatusCode::NOT_FOUND,
            PollError::PreconditionFailed(_) => StatusCode::CONFLICT,
            PollError::StorageConflict(_) => StatusCode::SERVICE_UNAVAILABLE,
            PollError::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, PollError::StorageConflict(_))
    }
}

impl From<StoreError> for PollError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => PollError::StorageConflict(msg),
            StoreError::Backend(msg) | StoreError::Corrupt(msg) => PollError::StorageFailure(msg),
        }
    }
}

impl IntoResponse for PollError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retryable = self.is_retryable();
        let body = Json(json!({ "error": self.to_string(), "code": self.code() }));
        let mut response = (status, body).into_response();
        if retryable {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

/// Startup and process-level failures.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("poll error: {0}")]
    Poll(#[from] PollError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
