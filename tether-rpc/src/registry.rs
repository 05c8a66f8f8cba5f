//! Endpoint registry.
//!
//! Hands out channel adapters on a shared transport and refuses a second
//! active claim on an inbound channel, which would otherwise misroute calls
//! and replies between cores.

use crate::error::RegistryError;
use crate::transport::{ChannelAdapter, PeerId, Transport};
use dashmap::DashMap;
use std::sync::Arc;
use tether_protocol::ChannelPair;

type Claims = DashMap<&'static str, Vec<Option<PeerId>>>;

/// Active inbound claims on one physical transport.
#[derive(Clone, Default)]
pub struct EndpointRegistry {
    claims: Arc<Claims>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `pair.inbound` and returns an adapter for it.
    ///
    /// A bound claim conflicts with an unbound claim on the same inbound name
    /// or with another claim for the same peer. An unbound claim conflicts
    /// with any claim on the name. The claim is released when the adapter is
    /// dropped or the core running on it closes.
    pub fn channel(
        &self,
        transport: Arc<dyn Transport>,
        pair: ChannelPair,
        peer: Option<PeerId>,
    ) -> Result<ChannelAdapter, RegistryError> {
        {
            let mut entry = self.claims.entry(pair.inbound).or_default();
            let conflict = match peer {
                None => !entry.is_empty(),
                Some(_) => entry.iter().any(|claimed| claimed.is_none() || *claimed == peer),
            };
            if conflict {
                return Err(RegistryError::InboundInUse {
                    inbound: pair.inbound.to_string(),
                    peer,
                });
            }
            entry.push(peer);
        }
        tracing::debug!("claimed inbound channel '{}' ({:?})", pair.inbound, peer);

        let claim = Claim {
            claims: self.claims.clone(),
            inbound: pair.inbound,
            peer,
        };
        let adapter = ChannelAdapter::new(transport, pair).with_claim(claim);
        Ok(match peer {
            Some(peer) => adapter.bound_to(peer),
            None => adapter,
        })
    }

    /// Returns whether any claim is active on an inbound name.
    pub fn is_claimed(&self, inbound: &str) -> bool {
        self.claims.get(inbound).map(|c| !c.is_empty()).unwrap_or(false)
    }

    /// Number of active claims.
    pub fn len(&self) -> usize {
        self.claims.iter().map(|c| c.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases an inbound claim on drop.
pub(crate) struct Claim {
    claims: Arc<Claims>,
    inbound: &'static str,
    peer: Option<PeerId>,
}

impl Drop for Claim {
    fn drop(&mut self) {
        if let Some(mut entry) = self.claims.get_mut(self.inbound) {
            if let Some(pos) = entry.iter().position(|p| *p == self.peer) {
                entry.swap_remove(pos);
            }
        }
        self.claims.remove_if(self.inbound, |_, peers| peers.is_empty());
        tracing::debug!("released inbound channel '{}' ({:?})", self.inbound, self.peer);
    }
}
