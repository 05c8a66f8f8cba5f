//! Endpoint definitions.
//!
//! Every logical endpoint owns a named channel pair and a closed set of
//! operations. The host and renderer see the same pair from opposite ends.

pub mod database;
pub mod file_dialog;
pub mod llm;
pub mod settings;

/// Push channel for host-initiated settings patches.
pub const SETTINGS_UPDATED: &str = "settings-updated";

/// The (outbound, inbound) channel names that scope one RPC core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelPair {
    pub outbound: &'static str,
    pub inbound: &'static str,
}

impl ChannelPair {
    pub const fn new(outbound: &'static str, inbound: &'static str) -> Self {
        Self { outbound, inbound }
    }

    /// Same pair seen from the peer.
    pub const fn reversed(self) -> Self {
        Self {
            outbound: self.inbound,
            inbound: self.outbound,
        }
    }
}

impl std::fmt::Display for ChannelPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}", self.outbound, self.inbound)
    }
}

/// Every standard endpoint as seen from the host.
pub const HOST_ENDPOINTS: [ChannelPair; 4] = [
    file_dialog::HOST,
    llm::HOST,
    settings::HOST,
    database::HOST,
];
