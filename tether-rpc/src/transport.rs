//! Transport abstraction and channel adapters.
//!
//! A [`Transport`] is the physical message primitive: fire a payload on a
//! named channel, or listen on one. A [`ChannelAdapter`] narrows a transport
//! to one (outbound, inbound) channel pair and, on the host, to one window.

use crate::error::TransportError;
use crate::registry::Claim;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether_protocol::ChannelPair;
use tokio::sync::mpsc;

/// Identifies one end of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

impl PeerId {
    /// The host process.
    pub const HOST: PeerId = PeerId(0);

    pub fn is_host(&self) -> bool {
        *self == PeerId::HOST
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_host() {
            write!(f, "host")
        } else {
            write!(f, "window-{}", self.0)
        }
    }
}

/// A message delivered to a channel listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Sender of the message.
    pub origin: PeerId,
    /// Encoded payload.
    pub payload: String,
}

pub type InboundReceiver = mpsc::UnboundedReceiver<Inbound>;

/// A one-directional, best-effort message primitive keyed by channel name.
pub trait Transport: Send + Sync + 'static {
    /// Fires a payload on a channel toward the peer. Never waits for delivery.
    fn send(&self, channel: &str, payload: String) -> Result<(), TransportError>;

    /// Registers a listener for a channel. Every listener on a channel
    /// receives every message sent on it.
    fn on(&self, channel: &str) -> Result<InboundReceiver, TransportError>;
}

/// Channel listeners keyed by name. Shared by the in-process and stream transports.
#[derive(Default)]
pub(crate) struct Listeners {
    channels: HashMap<String, Vec<mpsc::UnboundedSender<Inbound>>>,
}

impl Listeners {
    pub(crate) fn register(&mut self, channel: &str) -> InboundReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.entry(channel.to_string()).or_default().push(tx);
        rx
    }

    /// Delivers to every live listener. Returns the number reached.
    pub(crate) fn deliver(&mut self, channel: &str, inbound: Inbound) -> usize {
        let Some(senders) = self.channels.get_mut(channel) else {
            return 0;
        };
        senders.retain(|tx| tx.send(inbound.clone()).is_ok());
        let reached = senders.len();
        if reached == 0 {
            self.channels.remove(channel);
        }
        reached
    }

    /// Drops every listener, ending their receivers.
    pub(crate) fn clear(&mut self) {
        self.channels.clear();
    }
}

/// A transport scoped to one channel pair.
pub struct ChannelAdapter {
    transport: Arc<dyn Transport>,
    pair: ChannelPair,
    bound: Option<PeerId>,
    subscribed: AtomicBool,
    claim: Mutex<Option<Claim>>,
}

impl ChannelAdapter {
    pub fn new(transport: Arc<dyn Transport>, pair: ChannelPair) -> Self {
        Self {
            transport,
            pair,
            bound: None,
            subscribed: AtomicBool::new(false),
            claim: Mutex::new(None),
        }
    }

    /// Only accept inbound messages from `peer`.
    pub fn bound_to(mut self, peer: PeerId) -> Self {
        self.bound = Some(peer);
        self
    }

    pub(crate) fn with_claim(self, claim: Claim) -> Self {
        *self.claim.lock() = Some(claim);
        self
    }

    /// Releases the registry claim ahead of drop.
    pub(crate) fn release(&self) {
        self.claim.lock().take();
    }

    pub fn pair(&self) -> ChannelPair {
        self.pair
    }

    pub fn bound_peer(&self) -> Option<PeerId> {
        self.bound
    }

    /// Posts a payload on the outbound channel.
    pub fn post(&self, payload: String) -> Result<(), TransportError> {
        self.transport.send(self.pair.outbound, payload)
    }

    /// Subscribes to the inbound channel. May be called once per adapter.
    pub fn on(&self) -> Result<AdapterReceiver, TransportError> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadySubscribed(self.pair.inbound.to_string()));
        }
        let rx = match self.transport.on(self.pair.inbound) {
            Ok(rx) => rx,
            Err(e) => {
                self.subscribed.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        Ok(AdapterReceiver {
            rx,
            bound: self.bound,
        })
    }
}

/// Inbound payloads of one adapter, filtered to its bound peer.
pub struct AdapterReceiver {
    rx: InboundReceiver,
    bound: Option<PeerId>,
}

impl AdapterReceiver {
    /// Receives the next payload. Returns `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            let inbound = self.rx.recv().await?;
            match self.bound {
                Some(peer) if inbound.origin != peer => {
                    tracing::trace!("dropping message from {} (bound to {})", inbound.origin, peer);
                }
                _ => return Some(inbound.payload),
            }
        }
    }
}
