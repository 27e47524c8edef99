//! Key-value store error types

use thiserror::Error;

/// Errors raised by a key-value store backend
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Backend could not be reached
    #[error("Store connection error: {0}")]
    ConnectionError(String),

    /// Failed to serialize or deserialize a stored value
    #[error("Store serialization error: {0}")]
    SerializationError(String),

    /// Generic backend error
    #[error("Store backend error: {0}")]
    BackendError(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::SerializationError(error.to_string())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
