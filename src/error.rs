//! Error types for the caching proxy
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Storage Error Enum ==
/// Failures of the partitioned cache storage.
///
/// Callers log these and carry on: a failed write leaves the key absent, so the
/// next request goes back to the network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Writing the entry would push the partition over its byte budget
    #[error("Quota exceeded in '{cache_name}': {needed} bytes needed, {available} available")]
    QuotaExceeded {
        cache_name: String,
        needed: usize,
        available: usize,
    },

    /// A single response body is larger than any partition accepts
    #[error("Entry too large: {size} bytes (limit {limit})")]
    EntryTooLarge { size: usize, limit: usize },

    /// The named partition has never been opened
    #[error("Unknown cache partition: {0}")]
    UnknownPartition(String),
}

// == Fetch Error Enum ==
/// Failures talking to the upstream origin.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// The URL could not be parsed or resolved against the origin
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Connection, DNS or timeout failure
    #[error("Network error: {0}")]
    Network(String),

    /// The response body could not be read
    #[error("Failed to read response body: {0}")]
    Body(String),
}

// == API Error Enum ==
/// Errors surfaced over the HTTP API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Requested record or partition does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream fetch failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Storage failure that could not be absorbed
    #[error(transparent)]
    Storage(#[from] StorageError),
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Fetch(FetchError::InvalidUrl(_)) => StatusCode::BAD_REQUEST,
            ApiError::Fetch(_) => StatusCode::BAD_GATEWAY,
            ApiError::Storage(StorageError::UnknownPartition(_)) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::INSUFFICIENT_STORAGE,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the HTTP API.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_maps_to_bad_gateway() {
        let response = ApiError::from(FetchError::Network("refused".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_invalid_url_maps_to_bad_request() {
        let response = ApiError::from(FetchError::InvalidUrl("::".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unknown_partition_maps_to_not_found() {
        let err = StorageError::UnknownPartition("gone".to_string());
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_quota_message_names_partition() {
        let err = StorageError::QuotaExceeded {
            cache_name: "api-responses".to_string(),
            needed: 10,
            available: 4,
        };
        assert!(err.to_string().contains("api-responses"));
    }
}
