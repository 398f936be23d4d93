//! Store error types.

use thiserror::Error;

/// Error object returned by the backend service for a rejected or failed
/// request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    /// Human-readable message as reported by the backend.
    pub message: String,
}

impl BackendError {
    /// Creates a backend error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result type for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Input rejected locally before any remote call.
    #[error("{0}")]
    Validation(String),

    /// The backend rejected the request or could not be reached.
    #[error("{message}")]
    Remote { message: String },

    /// Entity not found.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// A row returned by the backend did not match the expected shape.
    #[error("Failed to decode {entity_type}: {source}")]
    Decode {
        entity_type: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Encoding a payload for the backend failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates a not found error.
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Returns true if the error was raised locally, without a remote call.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        Self::Remote {
            message: err.message,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error returned when a change filter expression cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid change filter: {0}")]
pub struct InvalidChangeFilter(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_displays_backend_message() {
        let err: StoreError = BackendError::new("duplicate key value").into();
        assert_eq!(err.to_string(), "duplicate key value");
        assert!(!err.is_validation());
    }

    #[test]
    fn test_not_found_display() {
        let err = StoreError::not_found("Todo", 12);
        assert_eq!(err.to_string(), "Todo not found: 12");
    }
}
