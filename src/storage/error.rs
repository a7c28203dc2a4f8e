//! Storage engine error types
//!
//! Defines all errors that can occur in the storage layer.

use thiserror::Error;

/// Errors that can occur in the storage engine
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Appending to the event log or rewriting the index snapshot failed.
    /// The insert that triggered it must not be treated as durably stored.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Data corruption detected (unparsable log line, malformed snapshot)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Requested collection is not configured
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Events must be JSON objects
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::CollectionNotFound("orders".to_string());
        assert_eq!(err.to_string(), "Collection not found: orders");

        let err = StorageError::Persistence("disk full".to_string());
        assert_eq!(err.to_string(), "Persistence error: disk full");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let storage_err: StorageError = io_err.into();
        assert!(matches!(storage_err, StorageError::Io(_)));
    }
}
