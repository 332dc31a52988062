//! Error types for the cache server
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Fetch Error Enum ==
/// Failure reported by an upstream fetch.
///
/// Cloned to every caller attached to the same in-flight fetch, so it only
/// carries owned, cheaply clonable data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Upstream answered with an error or could not be reached
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// No credentials were available to call the upstream
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// Upstream did not answer within the fetch timeout
    #[error("Upstream timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream answered with a body that could not be decoded
    #[error("Invalid upstream response: {0}")]
    Decode(String),
}

// == Cache Error Enum ==
/// Unified error type for the cache server.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The fetch behind a cache miss failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The caller is authenticated but may not perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The fetch task went away without producing an outcome
    #[error("Fetch interrupted: {0}")]
    Interrupted(String),

    /// The durable medium could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    /// A snapshot could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    /// The failure as reported to a cache layered on top of this one.
    pub fn into_fetch_error(self) -> FetchError {
        match self {
            CacheError::Fetch(err) => err,
            other => FetchError::Upstream(other.to_string()),
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::Fetch(FetchError::MissingCredentials(_)) => StatusCode::UNAUTHORIZED,
            CacheError::Fetch(FetchError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            CacheError::Fetch(_) => StatusCode::BAD_GATEWAY,
            CacheError::Forbidden(_) => StatusCode::FORBIDDEN,
            CacheError::Interrupted(_)
            | CacheError::Persistence(_)
            | CacheError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "success": false,
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache server.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                CacheError::Fetch(FetchError::MissingCredentials("no token".into())),
                StatusCode::UNAUTHORIZED,
            ),
            (
                CacheError::Fetch(FetchError::Timeout(Duration::from_secs(10))),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                CacheError::Fetch(FetchError::Upstream("503".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                CacheError::Forbidden("admin only".into()),
                StatusCode::FORBIDDEN,
            ),
            (
                CacheError::Interrupted("dropped".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_into_fetch_error() {
        let timeout = FetchError::Timeout(Duration::from_secs(1));
        assert_eq!(CacheError::Fetch(timeout.clone()).into_fetch_error(), timeout);
        assert_eq!(
            CacheError::Interrupted("gone".into()).into_fetch_error(),
            FetchError::Upstream("Fetch interrupted: gone".into())
        );
    }

    #[test]
    fn test_fetch_error_is_transparent() {
        let error = CacheError::from(FetchError::Upstream("boom".into()));
        assert_eq!(error.to_string(), "Upstream failure: boom");
    }
}
