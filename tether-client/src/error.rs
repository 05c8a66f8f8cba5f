//! Client error types.

use std::time::Duration;
use tether_protocol::{ErrorCode, ProtocolError};
use tether_rpc::{RegistryError, RpcError, TransportError};
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("bridge closed")]
    Closed,

    #[error("call to {method} timed out after {after:?}")]
    Timeout { method: String, after: Duration },

    #[error("host error: {code} - {message}")]
    HostError {
        code: ErrorCode,
        message: String,
        retryable: bool,
    },

    #[error("unexpected result from {method}: {reason}")]
    Decode { method: String, reason: String },
}

impl From<RpcError> for ClientError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Timeout { method, after } => ClientError::Timeout { method, after },
            RpcError::Remote(err) => ClientError::HostError {
                code: err.code,
                message: err.message,
                retryable: err.retryable,
            },
            RpcError::Serialization(e) => ClientError::Protocol(e),
            RpcError::Transport(TransportError::Closed) | RpcError::Closed => ClientError::Closed,
            RpcError::Transport(e) => ClientError::Transport(e),
            RpcError::Decode { method, reason } => ClientError::Decode { method, reason },
        }
    }
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::Timeout { .. } => true,
            ClientError::HostError { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// The host's error code, if the host rejected the call.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::HostError { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == Some(ErrorCode::NotFound)
    }
}
