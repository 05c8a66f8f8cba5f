//! RPC error types.

use crate::transport::PeerId;
use std::time::Duration;
use tether_protocol::{ErrorCode, ProtocolError, RemoteError};
use thiserror::Error;

/// Errors raised by a physical transport or a channel adapter.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("channel '{0}' already has a listener on this adapter")]
    AlreadySubscribed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Errors surfaced to the caller of a remote function.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("call to {method} timed out after {after:?}")]
    Timeout { method: String, after: Duration },

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("serialization error: {0}")]
    Serialization(#[from] ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("rpc core closed")]
    Closed,

    #[error("failed to decode result of {method}: {reason}")]
    Decode { method: String, reason: String },
}

impl RpcError {
    /// Returns whether the caller may retry the call.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Timeout { .. } => true,
            RpcError::Closed => true,
            RpcError::Transport(TransportError::Closed) => true,
            RpcError::Transport(TransportError::Io(_)) => true,
            RpcError::Remote(err) => err.retryable,
            _ => false,
        }
    }

    /// Returns the remote error code, if the callee rejected the call.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            RpcError::Remote(err) => Some(err.code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout { .. })
    }
}

/// Errors raised when claiming a channel in an endpoint registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("inbound channel '{inbound}' is already claimed{}", claim_target(.peer))]
    InboundInUse {
        inbound: String,
        peer: Option<PeerId>,
    },
}

fn claim_target(peer: &Option<PeerId>) -> String {
    peer.map(|p| format!(" for {}", p)).unwrap_or_default()
}
