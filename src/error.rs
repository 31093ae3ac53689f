//! Error types for the Learou knowledge tracker
//!
//! This module provides structured error handling using thiserror for the
//! library and anyhow for propagation at the binary boundary.

use serde::Serialize;
use thiserror::Error;

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field name (`__all__` for record-level failures)
    pub field: String,
    /// Human readable message
    pub message: String,
}

/// Collection of field errors raised by one create/update attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

/// Field name used for errors that are not tied to one field
pub const NON_FIELD_ERRORS: &str = "__all__";

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Shorthand for a single error on one field
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Errors attached to one field
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldError> + 'a {
        self.0.iter().filter(move |e| e.field == field)
    }

    /// Convert into `Err(Validation)` when any error was collected
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(LearouError::Validation(self))
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Main error type for Learou operations
#[derive(Error, Debug)]
pub enum LearouError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Schema migration failed
    #[error("Migration error: {0}")]
    Migration(String),

    /// Requested record does not exist for the given kind
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// Field constraints violated
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Unauthenticated mutation attempt
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Controller or registry wired incorrectly; fatal at startup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Settings could not be loaded
    #[error("Settings error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl LearouError {
    pub fn not_found(kind: impl Into<String>, id: impl std::fmt::Display) -> Self {
        LearouError::NotFound {
            kind: kind.into(),
            id: id.to_string(),
        }
    }

    /// Errors the caller caused and can correct
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LearouError::NotFound { .. }
                | LearouError::Validation(_)
                | LearouError::PermissionDenied(_)
        )
    }
}

/// Result type alias for Learou operations
pub type Result<T> = std::result::Result<T, LearouError>;

impl From<libsql::Error> for LearouError {
    fn from(err: libsql::Error) -> Self {
        LearouError::Database(err.to_string())
    }
}

/// Convert anyhow::Error to LearouError
impl From<anyhow::Error> for LearouError {
    fn from(err: anyhow::Error) -> Self {
        LearouError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LearouError::not_found("Task", 42);
        assert_eq!(err.to_string(), "Task not found: 42");
    }

    #[test]
    fn test_validation_display_joins_fields() {
        let mut errors = ValidationErrors::new();
        errors.add("name", "This field is required");
        errors.add("url", "Enter a valid URL");
        let err = LearouError::Validation(errors);
        assert_eq!(
            err.to_string(),
            "Validation failed: name: This field is required; url: Enter a valid URL"
        );
    }

    #[test]
    fn test_into_result() {
        assert!(ValidationErrors::new().into_result().is_ok());
        let err = ValidationErrors::single("name", "taken").into_result().unwrap_err();
        assert!(matches!(err, LearouError::Validation(ref e) if e.len() == 1));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: LearouError = json_err.into();
        assert!(matches!(err, LearouError::Serialization(_)));
        assert!(!err.is_client_error());
    }
}
