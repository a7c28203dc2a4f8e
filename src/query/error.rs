//! Query error types
//!
//! Defines all error conditions that can occur while decoding and executing
//! list and chart queries.

use crate::schema::ValidationError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// The request body was rejected by the decoder
    #[error("Invalid query: {0}")]
    Validation(#[from] ValidationError),

    /// A date histogram window is wider than its granularity allows
    #[error("Date range too large for {granularity} buckets: {limit}")]
    RangeExceeded {
        granularity: String,
        limit: String,
    },

    /// A numeric histogram would produce more buckets than allowed
    #[error("Histogram would produce {requested} buckets, at most {limit} allowed")]
    TooManyBuckets { requested: u64, limit: u64 },

    /// Declared Y aggregation with no computation behind it
    #[error("Unsupported aggregation: {0}")]
    UnsupportedAggregation(String),

    /// The requested collection is not configured
    #[error("Collection not found: {0}")]
    UnknownCollection(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for QueryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::CollectionNotFound(name) => Self::UnknownCollection(name),
            other => Self::Storage(other),
        }
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_not_found_maps_to_unknown_collection() {
        let err = QueryError::from(StorageError::CollectionNotFound("pets".into()));
        assert!(matches!(err, QueryError::UnknownCollection(ref name) if name == "pets"));
    }

    #[test]
    fn test_range_exceeded_message() {
        let err = QueryError::RangeExceeded {
            granularity: "second".into(),
            limit: "at most 300 seconds".into(),
        };
        assert_eq!(
            err.to_string(),
            "Date range too large for second buckets: at most 300 seconds"
        );
    }
}
