//! # tether-protocol
//!
//! Wire protocol for tether, the host/UI bridge.
//!
//! This crate provides:
//! - Call and reply envelopes with correlation ids
//! - JSON codec for envelopes, arguments and results
//! - Binary link framing with channel names and CRC32C validation
//! - Stable error codes for remote failures
//! - The operation sets of every endpoint (settings, file dialog, model control, database)

pub mod codec;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod message;
pub mod procedure;

pub use codec::Codec;
pub use endpoint::ChannelPair;
pub use error::{ErrorCode, ProtocolError};
pub use frame::{Frame, FrameDecoder, FrameFlags, FRAME_HEADER_SIZE, MAGIC};
pub use message::{CallEnvelope, Envelope, RemoteError, ReplyEnvelope};
pub use procedure::{Args, NoProcedures, Procedure};

/// Protocol version supported by this implementation.
pub const PROTOCOL_VERSION: u16 = 1;

/// Maximum frame payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Maximum channel name length carried in a frame header extension.
pub const MAX_CHANNEL_NAME_LEN: usize = 256;
