//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror.
//!
//! Store and serialization failures never escape the public cache operations;
//! they are logged and degraded to a miss or a no-op. The variants here exist
//! so the adapter, the codec and the admin surface can describe what went wrong.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Store Error ==
/// Failure reported by a [`KvStore`](crate::store::KvStore) implementation.
///
/// Both variants mean the shared store could not be reached in time. The
/// adapter never retries; callers decide whether to fall back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection, pool or command failure
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Command exceeded the configured command timeout
    #[error("store command timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type returned by store adapters.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// == Cache Error Enum ==
/// Unified error type for the cache layer and its admin surface.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The shared store could not serve the request
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// A value could not be encoded or decoded
    #[error("Serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) | CacheError::Serialization(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Timeout(Duration::from_millis(200));
        assert_eq!(err.to_string(), "store command timed out after 200ms");

        let err = StoreError::Unavailable("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_status_mapping() {
        let response = CacheError::NotFound("k".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = CacheError::InvalidRequest("bad".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response =
            CacheError::from(StoreError::Unavailable("down".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
