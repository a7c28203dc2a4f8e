//! Schema and validation error types

use serde::Serialize;
use thiserror::Error;

/// Errors raised while loading a schema document
#[derive(Error, Debug)]
pub enum SchemaError {
    /// A leaf type spec did not match the grammar
    #[error("Invalid type spec '{spec}' at {path}: {reason}")]
    InvalidSpec {
        path: String,
        spec: String,
        reason: String,
    },

    /// A schema node was neither a type spec string nor an object
    #[error("Invalid schema node at {path}: expected a type spec string or an object")]
    InvalidNode { path: String },

    /// Schema file could not be read
    #[error("Failed to read schema file {path}: {error}")]
    Io { path: String, error: String },

    /// Schema file is not valid JSON
    #[error("Failed to parse schema JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Built-in pattern failed to compile
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// One offending location in a rejected payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    /// Dot path of the offending field (empty for the payload itself)
    pub path: String,
    /// Human-readable reason
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A payload failed validation; carries every issue found
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{}", join_messages(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    /// Single-issue shorthand
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![ValidationIssue::new(path, message)])
    }

    /// Paths of all offending fields
    pub fn paths(&self) -> Vec<&str> {
        self.issues.iter().map(|i| i.path.as_str()).collect()
    }
}

fn join_messages(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.message.as_str())
        .collect::<Vec<_>>()
        .join(". ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_joins_issues() {
        let err = ValidationError::new(vec![
            ValidationIssue::new("event.when", "\"event.when\" is required"),
            ValidationIssue::new("foo", "\"foo\" is not allowed"),
        ]);
        assert_eq!(
            err.to_string(),
            "\"event.when\" is required. \"foo\" is not allowed"
        );
        assert_eq!(err.paths(), vec!["event.when", "foo"]);
    }
}
