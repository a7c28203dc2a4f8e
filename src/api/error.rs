//! API Error Types
//!
//! Defines error types for the API layer and implements conversion
//! to HTTP responses with appropriate status codes.
//!
//! Rejected payloads answer with the validation body
//! `{"type": "ValidationError", "details": [{path, message}, ...]}`;
//! every other failure with `{"error": {code, message}, "request_id"}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::query::QueryError;
use crate::schema::{ValidationError, ValidationIssue};
use crate::storage::StorageError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request payload failed validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(QueryError),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(StorageError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Validation(e) => Self::Validation(e),
            QueryError::UnknownCollection(name) => {
                Self::NotFound(format!("collection '{}'", name))
            }
            QueryError::Storage(e) => Self::from(e),
            other => Self::Query(other),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::CollectionNotFound(name) => {
                Self::NotFound(format!("collection '{}'", name))
            }
            other => Self::Storage(other),
        }
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Validation failure body
#[derive(Serialize)]
pub struct ValidationResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub details: Vec<ValidationIssue>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Query(QueryError::RangeExceeded { .. }) => {
                (StatusCode::BAD_REQUEST, "RANGE_EXCEEDED")
            }
            ApiError::Query(QueryError::UnsupportedAggregation(_)) => {
                (StatusCode::BAD_REQUEST, "UNSUPPORTED_AGGREGATION")
            }
            ApiError::Query(_) => (StatusCode::BAD_REQUEST, "QUERY_ERROR"),
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        };

        let request_id = uuid::Uuid::new_v4().to_string();

        tracing::error!(
            request_id = %request_id,
            error_code = %code,
            error_message = %self,
            "API error occurred"
        );

        if let ApiError::Validation(err) = self {
            let body = ValidationResponse {
                kind: "ValidationError",
                details: err.issues,
            };
            return (status, Json(body)).into_response();
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_mapping() {
        let err = ApiError::from(QueryError::UnknownCollection("orders".to_string()));
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = ApiError::from(QueryError::Validation(ValidationError::single("x", "bad")));
        assert!(matches!(err, ApiError::Validation(_)));

        let err = ApiError::from(QueryError::UnsupportedAggregation("topHit".to_string()));
        assert_eq!(
            err.into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_storage_error_status() {
        let err = ApiError::from(StorageError::Persistence("disk full".to_string()));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
