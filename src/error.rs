//! Error types for the weather cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Errors raised by the store and the request layer.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid request data (bad location, bad watermark, unknown mode)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Backing store could not be read or written
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Unavailable(format!("corrupt record: {}", err))
    }
}

// == Fetch Error Enum ==
/// Failure of a single upstream fetch.
///
/// `Clone` so one outcome can be handed to every caller waiting on a claim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Upstream exceeded the allowed time bound
    #[error("Upstream timed out")]
    Timeout,

    /// Upstream reported an invalid or unavailable location
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Local throttling refused the fetch
    #[error("Rate limited")]
    RateLimited,
}

impl FetchError {
    /// Returns the caller-facing error kind for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Timeout => ErrorKind::Timeout,
            FetchError::Upstream(_) => ErrorKind::UpstreamError,
            FetchError::RateLimited => ErrorKind::RateLimited,
        }
    }
}

// == Error Kind ==
/// Failure taxonomy reported on `ERROR` read outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    UpstreamError,
    RateLimited,
    CacheUnavailable,
}

impl ErrorKind {
    /// HTTP status used when a read ends in this error.
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::UpstreamError => StatusCode::BAD_GATEWAY,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::CacheUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            CacheError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::new(msg)),
            CacheError::Unavailable(msg) => {
                let kind = ErrorKind::CacheUnavailable;
                let mut body = ErrorResponse::from_kind(kind);
                body.error = format!("{}: {}", body.error, msg);
                (kind.status_code(), body)
            }
            CacheError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::new(msg)),
        };

        (status, Json(body)).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the weather cache.
pub type Result<T> = std::result::Result<T, CacheError>;
