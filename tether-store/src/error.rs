//! Storage error types.

use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Model with id {0} not found")]
    ModelNotFound(String),

    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("unknown storage engine: {0}")]
    UnknownEngine(String),

    #[error("storage task failed: {0}")]
    Task(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::ModelNotFound(_))
    }
}
