/// Unified error types for the flashcard graph service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for card operations
#[derive(Error, Debug)]
pub enum CardError {
    /// Failure reported by the underlying key-value store
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A storage call exceeded its per-call timeout
    #[error("Storage operation '{operation}' timed out after {timeout_ms}ms")]
    StorageTimeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// Request refused by the store before execution (e.g. empty batch)
    #[error("Storage rejected request: {0}")]
    StorageRejected(String),

    /// Persisted row that cannot be decoded
    #[error("Malformed row: {0}")]
    MalformedRow(String),

    /// Pagination token that does not decode to a key for this query
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Secondary index did not reflect preceding writes in time
    #[error(
        "Index for label '{label}' showed {observed} of {expected} rows after {waited_ms}ms"
    )]
    ConsistencyTimeout {
        label: String,
        expected: usize,
        observed: usize,
        waited_ms: u64,
    },

    /// Caller identity missing from the request
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CardError {
    /// True for every failure originating in the storage layer
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            CardError::Storage(_)
                | CardError::StorageTimeout { .. }
                | CardError::StorageRejected(_)
                | CardError::MalformedRow(_)
        )
    }
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert CardError to HTTP response
impl IntoResponse for CardError {
    fn into_response(self) -> Response {
        if self.is_storage_error() || matches!(self, CardError::Internal(_) | CardError::Io(_)) {
            tracing::error!(error = %self, "request failed");
        }

        let (status, error_code, message) = match self {
            CardError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            CardError::InvalidCursor(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidCursor",
                self.to_string(),
            ),
            CardError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            CardError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "NotFound",
                self.to_string(),
            ),
            CardError::ConsistencyTimeout { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "IndexNotSettled",
                self.to_string(),
            ),
            CardError::StorageTimeout { .. } => (
                StatusCode::GATEWAY_TIMEOUT,
                "StorageTimeout",
                "Storage did not respond in time".to_string(),
            ),
            CardError::Storage(_)
            | CardError::StorageRejected(_)
            | CardError::MalformedRow(_)
            | CardError::Internal(_)
            | CardError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for card operations
pub type CardResult<T> = Result<T, CardError>;
