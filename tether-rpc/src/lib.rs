//! # tether-rpc
//!
//! Bidirectional RPC over a fire-and-forget message primitive.
//!
//! This crate provides:
//! - The [`Transport`] abstraction with in-process ([`MemoryHub`]) and
//!   byte-stream ([`StreamLink`]) implementations
//! - [`ChannelAdapter`], scoping a transport to one channel pair and one window
//! - [`RpcCore`], correlating calls with replies under per-call timeouts
//! - [`EndpointRegistry`], keeping inbound channel names from colliding

pub mod core;
pub mod error;
pub mod link;
pub mod memory;
pub mod registry;
pub mod service;
pub mod transport;

pub use crate::core::{
    Diagnostic, DiagnosticHook, RpcConfig, RpcCore, TracingDiagnostics, HOST_CALL_TIMEOUT,
    RENDERER_CALL_TIMEOUT,
};
pub use error::{RegistryError, RpcError, TransportError};
pub use link::StreamLink;
pub use memory::{HostPort, MemoryHub, WindowPort};
pub use registry::EndpointRegistry;
pub use service::{reply, NoService, Service};
pub use transport::{AdapterReceiver, ChannelAdapter, Inbound, InboundReceiver, PeerId, Transport};
