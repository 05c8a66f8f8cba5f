//! Host error types.

use crate::config::ConfigError;
use tether_protocol::{ErrorCode, RemoteError};
use tether_rpc::{RegistryError, TransportError};
use tether_store::StorageError;
use thiserror::Error;

/// Host errors.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("settings file error: {0}")]
    Settings(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("no model loaded")]
    ModelNotLoaded,

    #[error("a prompt is already running")]
    PromptInProgress,
}

impl HostError {
    /// Converts to protocol error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            HostError::Storage(e) if e.is_not_found() => ErrorCode::NotFound,
            HostError::ModelNotLoaded => ErrorCode::Unavailable,
            HostError::Io(_) | HostError::Storage(_) | HostError::Settings(_) => {
                ErrorCode::InternalError
            }
            _ => ErrorCode::HandlerFailed,
        }
    }

    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.error_code().is_retryable()
    }

    /// Converts into the error carried by an error reply.
    pub fn into_remote(self) -> RemoteError {
        RemoteError::new(self.error_code(), self.to_string())
    }
}

/// Maps any host-side failure into a remote error.
pub(crate) fn remote(err: impl Into<HostError>) -> RemoteError {
    err.into().into_remote()
}
