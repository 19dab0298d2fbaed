//! Storage error types

use thiserror::Error;

/// Errors that can occur when reading or writing pipeline records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Requested record does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Interaction refers to a session that does not exist
    #[error("Session not found: {0}")]
    SessionNotFound(i64),

    /// Status value outside the persisted vocabulary, or not allowed here
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// Storage mutex was poisoned by a panicking writer
    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Create a not-found error for an interaction
    pub fn interaction_not_found(id: impl std::fmt::Display) -> Self {
        StoreError::NotFound(format!("interaction {}", id))
    }

    /// Check if this error means the record is missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::SessionNotFound(_))
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = StoreError::interaction_not_found(42);
        assert_eq!(err.to_string(), "Record not found: interaction 42");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_database_error_is_not_not_found() {
        let err = StoreError::from(rusqlite::Error::InvalidQuery);
        assert!(!err.is_not_found());
        assert!(err.to_string().starts_with("Database error"));
    }
}
