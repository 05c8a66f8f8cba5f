//! In-process transport: one host, many windows.

use crate::error::TransportError;
use crate::transport::{Inbound, InboundReceiver, Listeners, PeerId, Transport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct HubInner {
    host: Mutex<Listeners>,
    windows: Mutex<HashMap<PeerId, Listeners>>,
    next_window: AtomicU64,
}

/// Message hub connecting a host with any number of windows in one process.
///
/// Host sends reach only the addressed window. Window sends reach every host
/// listener, tagged with the window's id.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new window and returns its side of the hub.
    pub fn open_window(&self) -> WindowPort {
        let id = PeerId(self.inner.next_window.fetch_add(1, Ordering::SeqCst) + 1);
        self.inner.windows.lock().insert(id, Listeners::default());
        tracing::debug!("opened {}", id);
        WindowPort {
            hub: self.clone(),
            id,
        }
    }

    /// Returns the host's transport toward one window.
    pub fn host_port(&self, window: PeerId) -> HostPort {
        HostPort {
            hub: self.clone(),
            window,
        }
    }

    /// Closes a window. Its listeners end and further sends to or from it fail.
    pub fn close_window(&self, window: PeerId) -> bool {
        let closed = self.inner.windows.lock().remove(&window).is_some();
        if closed {
            tracing::debug!("closed {}", window);
        }
        closed
    }

    pub fn window_count(&self) -> usize {
        self.inner.windows.lock().len()
    }

    pub fn is_open(&self, window: PeerId) -> bool {
        self.inner.windows.lock().contains_key(&window)
    }
}

/// Host-side transport addressing one window.
#[derive(Clone)]
pub struct HostPort {
    hub: MemoryHub,
    window: PeerId,
}

impl HostPort {
    pub fn window(&self) -> PeerId {
        self.window
    }
}

impl Transport for HostPort {
    fn send(&self, channel: &str, payload: String) -> Result<(), TransportError> {
        let mut windows = self.hub.inner.windows.lock();
        let listeners = windows.get_mut(&self.window).ok_or(TransportError::Closed)?;
        listeners.deliver(
            channel,
            Inbound {
                origin: PeerId::HOST,
                payload,
            },
        );
        Ok(())
    }

    fn on(&self, channel: &str) -> Result<InboundReceiver, TransportError> {
        Ok(self.hub.inner.host.lock().register(channel))
    }
}

/// Window-side transport.
#[derive(Clone)]
pub struct WindowPort {
    hub: MemoryHub,
    id: PeerId,
}

impl WindowPort {
    pub fn id(&self) -> PeerId {
        self.id
    }
}

impl Transport for WindowPort {
    fn send(&self, channel: &str, payload: String) -> Result<(), TransportError> {
        if !self.hub.is_open(self.id) {
            return Err(TransportError::Closed);
        }
        self.hub.inner.host.lock().deliver(
            channel,
            Inbound {
                origin: self.id,
                payload,
            },
        );
        Ok(())
    }

    fn on(&self, channel: &str) -> Result<InboundReceiver, TransportError> {
        let mut windows = self.hub.inner.windows.lock();
        let listeners = windows.get_mut(&self.id).ok_or(TransportError::Closed)?;
        Ok(listeners.register(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_host_send_reaches_only_addressed_window() {
        let hub = MemoryHub::new();
        let w1 = hub.open_window();
        let w2 = hub.open_window();
        let mut rx1 = w1.on("settings-updated").unwrap();
        let mut rx2 = w2.on("settings-updated").unwrap();

        hub.host_port(w2.id())
            .send("settings-updated", r#"{"theme":"dark"}"#.into())
            .unwrap();

        let got = rx2.recv().await.unwrap();
        assert_eq!(got.payload, r#"{"theme":"dark"}"#);
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_window_send_is_tagged() {
        let hub = MemoryHub::new();
        let window = hub.open_window();
        let mut host_rx = hub.host_port(window.id()).on("llmRpc").unwrap();

        window.send("llmRpc", "x".into()).unwrap();
        assert_eq!(host_rx.recv().await.unwrap().origin, window.id());
    }

    #[tokio::test]
    async fn test_every_listener_receives() {
        let hub = MemoryHub::new();
        let window = hub.open_window();
        let mut a = window.on("c").unwrap();
        let mut b = window.on("c").unwrap();

        hub.host_port(window.id()).send("c", "m".into()).unwrap();
        assert_eq!(a.recv().await.unwrap().payload, "m");
        assert_eq!(b.recv().await.unwrap().payload, "m");
    }

    #[tokio::test]
    async fn test_close_window_ends_receivers() {
        let hub = MemoryHub::new();
        let window = hub.open_window();
        let mut rx = window.on("c").unwrap();
        let host = hub.host_port(window.id());

        assert!(hub.close_window(window.id()));
        assert!(!hub.close_window(window.id()));
        assert!(rx.recv().await.is_none());
        assert!(matches!(host.send("c", "m".into()), Err(TransportError::Closed)));
        assert!(matches!(window.send("c", "m".into()), Err(TransportError::Closed)));
        assert_eq!(hub.window_count(), 0);
    }
}
