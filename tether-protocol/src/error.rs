//! Protocol error types and error codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Protocol-level errors that can occur during framing, encoding or decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid magic bytes: expected 'TTHR', got {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("channel name too long: {len} bytes (max {max})")]
    ChannelNameTooLong { len: usize, max: usize },

    #[error("CRC mismatch: expected {expected:#x}, got {actual:#x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("invalid frame flags: {0:#x}")]
    InvalidFlags(u16),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid arguments for {method}: {reason}")]
    InvalidArgs { method: String, reason: String },
}

impl ProtocolError {
    /// Returns the error code used when this error is reported to a remote caller.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ProtocolError::UnknownMethod(_) => ErrorCode::UnknownMethod,
            ProtocolError::InvalidArgs { .. } => ErrorCode::InvalidArguments,
            ProtocolError::Json(_) => ErrorCode::InternalError,
            _ => ErrorCode::BadRequest,
        }
    }
}

/// Stable error codes carried in error replies.
///
/// These codes are part of the protocol contract and must remain stable
/// across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Protocol errors
    BadRequest,
    UnknownMethod,
    InvalidArguments,

    // Application errors
    NotFound,
    HandlerFailed,
    HandlerPanicked,

    // System errors
    Unavailable,
    InternalError,
}

impl ErrorCode {
    /// Returns whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::Unavailable | ErrorCode::InternalError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::BadRequest => write!(f, "BAD_REQUEST"),
            ErrorCode::UnknownMethod => write!(f, "UNKNOWN_METHOD"),
            ErrorCode::InvalidArguments => write!(f, "INVALID_ARGUMENTS"),
            ErrorCode::NotFound => write!(f, "NOT_FOUND"),
            ErrorCode::HandlerFailed => write!(f, "HANDLER_FAILED"),
            ErrorCode::HandlerPanicked => write!(f, "HANDLER_PANICKED"),
            ErrorCode::Unavailable => write!(f, "UNAVAILABLE"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}
