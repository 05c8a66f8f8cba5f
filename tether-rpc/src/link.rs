//! Framed transport over a byte stream.
//!
//! Connects two processes through any `AsyncRead`/`AsyncWrite` pair such as
//! stdio pipes or a socket. Each message is one [`Frame`] naming its channel.

use crate::error::TransportError;
use crate::transport::{Inbound, InboundReceiver, Listeners, PeerId, Transport};
use bytes::BytesMut;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether_protocol::{Frame, FrameDecoder};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Read buffer size (8 KiB).
pub const READ_BUFFER_SIZE: usize = 8 * 1024;

enum Outgoing {
    Data(BytesMut),
    Goodbye(BytesMut),
}

struct LinkInner {
    outbound: mpsc::UnboundedSender<Outgoing>,
    listeners: Mutex<Listeners>,
    closed: AtomicBool,
    closed_signal: watch::Sender<bool>,
    remote: PeerId,
}

impl LinkInner {
    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.listeners.lock().clear();
        self.closed_signal.send_replace(true);
    }
}

/// A transport carried over a byte stream.
pub struct StreamLink {
    inner: Arc<LinkInner>,
    reader: JoinHandle<()>,
}

impl StreamLink {
    /// Starts the link. Inbound messages are attributed to `remote`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<R, W>(reader: R, writer: W, remote: PeerId) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(LinkInner {
            outbound: tx,
            listeners: Mutex::new(Listeners::default()),
            closed: AtomicBool::new(false),
            closed_signal: watch::channel(false).0,
            remote,
        });

        // Weak so the writer ends once the link and its sender are gone.
        let writer_inner = Arc::downgrade(&inner);
        tokio::spawn(async move {
            if let Err(e) = write_loop(writer, rx).await {
                tracing::warn!("link writer stopped: {}", e);
            }
            if let Some(inner) = writer_inner.upgrade() {
                inner.shutdown();
            }
        });

        let reader_inner = inner.clone();
        let reader = tokio::spawn(async move {
            match read_loop(reader, &reader_inner).await {
                Ok(()) => tracing::debug!("link to {} closed by peer", reader_inner.remote),
                Err(e) => tracing::warn!("link reader stopped: {}", e),
            }
            reader_inner.shutdown();
        });

        Self { inner, reader }
    }

    /// Starts a link on this process's stdin and stdout.
    pub fn stdio(remote: PeerId) -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout(), remote)
    }

    /// The peer at the other end of the link.
    pub fn remote(&self) -> PeerId {
        self.inner.remote
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Tells the peer no further frames follow and closes the link.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(goodbye) = Frame::goodbye().encode() {
            let _ = self.inner.outbound.send(Outgoing::Goodbye(goodbye));
        }
        self.inner.shutdown();
    }

    /// Waits until either side closes the link or the stream ends.
    pub async fn closed(&self) {
        let mut signal = self.inner.closed_signal.subscribe();
        let _ = signal.wait_for(|closed| *closed).await;
    }
}

impl Drop for StreamLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl Transport for StreamLink {
    fn send(&self, channel: &str, payload: String) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let encoded = Frame::new(channel, payload).encode()?;
        self.inner
            .outbound
            .send(Outgoing::Data(encoded))
            .map_err(|_| TransportError::Closed)
    }

    fn on(&self, channel: &str) -> Result<InboundReceiver, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        Ok(self.inner.listeners.lock().register(channel))
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Outgoing>) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(outgoing) = rx.recv().await {
        match outgoing {
            Outgoing::Data(bytes) => {
                writer.write_all(&bytes).await?;
                writer.flush().await?;
            }
            Outgoing::Goodbye(bytes) => {
                writer.write_all(&bytes).await?;
                writer.flush().await?;
                break;
            }
        }
    }
    writer.shutdown().await?;
    Ok(())
}

async fn read_loop<R>(mut reader: R, inner: &LinkInner) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        decoder.extend(&buf[..n]);

        while let Some(frame) = decoder.decode_frame()? {
            if frame.flags.is_goodbye() {
                return Ok(());
            }
            // The frame is fully consumed, so the stream stays aligned.
            let payload = match frame.payload_str() {
                Ok(payload) => payload.to_string(),
                Err(e) => {
                    tracing::warn!("dropping frame on channel '{}': {}", frame.channel, e);
                    continue;
                }
            };
            let reached = inner.listeners.lock().deliver(
                &frame.channel,
                Inbound {
                    origin: inner.remote,
                    payload,
                },
            );
            if reached == 0 {
                tracing::debug!("no listener on channel '{}', frame dropped", frame.channel);
            }
        }
    }
}
