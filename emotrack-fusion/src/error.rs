//! Error types for emotrack-fusion
//!
//! [`FusionError`] is the core's taxonomy; [`ApiError`] is its HTTP face.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::registry::SessionId;

/// Session lifecycle and finalization errors
#[derive(Debug, Error)]
pub enum FusionError {
    /// Unknown, expired, or already-stopped session
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    /// Stop raced with another stop on the same session record
    #[error("Session already finalized: {0}")]
    AlreadyFinalized(SessionId),

    /// No qualifying probability frames once neutral is excluded
    #[error("No qualifying frames for session: {0}")]
    NoData(SessionId),
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or wrong Authorization header (401)
    #[error("Unauthorized")]
    Unauthorized,

    /// Conflict (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request understood but nothing to decide from (422)
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// emotrack-common error
    #[error("Common error: {0}")]
    Common(#[from] emotrack_common::Error),
}

impl From<FusionError> for ApiError {
    fn from(err: FusionError) -> Self {
        match err {
            FusionError::NotFound(_) => ApiError::NotFound(err.to_string()),
            FusionError::AlreadyFinalized(_) => ApiError::Conflict(err.to_string()),
            FusionError::NoData(_) => ApiError::Unprocessable(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Unauthorized".to_string(),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "NO_DATA", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(emotrack_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(emotrack_common::Error::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
