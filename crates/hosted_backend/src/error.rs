//! Client error types.

use thiserror::Error;
use todo_store::BackendError;

/// Errors raised while talking to the hosted service.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    /// The service answered with an error status.
    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Realtime error: {0}")]
    Realtime(String),
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

impl From<ClientError> for BackendError {
    fn from(err: ClientError) -> Self {
        BackendError::new(err.to_string())
    }
}
