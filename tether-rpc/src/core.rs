//! RPC core: call correlation over one channel pair.
//!
//! An [`RpcCore`] serves a local [`Service`] to the peer and calls the peer's
//! operations `R`. Outgoing calls are tracked in a pending map keyed by a
//! per-core monotonic id; incoming envelopes are told apart by shape.
//!
//! The dispatch loop never fails because of a message. Malformed input,
//! unmatched replies and failures to send a reply are reported to a
//! [`DiagnosticHook`] instead.

use crate::error::{RpcError, TransportError};
use crate::service::Service;
use crate::transport::{AdapterReceiver, ChannelAdapter};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether_protocol::{
    CallEnvelope, ChannelPair, Codec, Envelope, ErrorCode, Procedure, RemoteError, ReplyEnvelope,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Default call timeout on the renderer side.
pub const RENDERER_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default call timeout on the host side.
pub const HOST_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// RPC core configuration.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Time to wait for a reply before failing the call.
    pub call_timeout: Duration,
}

impl RpcConfig {
    pub fn new(call_timeout: Duration) -> Self {
        Self { call_timeout }
    }

    pub fn renderer() -> Self {
        Self::new(RENDERER_CALL_TIMEOUT)
    }

    pub fn host() -> Self {
        Self::new(HOST_CALL_TIMEOUT)
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::renderer()
    }
}

/// Something that went wrong outside any caller's reach.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// An inbound payload was not a valid envelope.
    MalformedMessage { reason: String },
    /// A reply arrived for an id with no pending call (late or foreign).
    UnmatchedReply { id: String },
    /// A local handler rejected a call. The caller receives the error.
    HandlerFailed {
        id: String,
        method: String,
        error: RemoteError,
    },
    /// A reply could not be encoded.
    ReplyEncodeFailed { id: String, reason: String },
    /// A reply could not be posted.
    ReplyPostFailed { id: String, reason: String },
}

/// Receives diagnostics from a core.
pub trait DiagnosticHook: Send + Sync + 'static {
    fn report(&self, channel: ChannelPair, diagnostic: &Diagnostic);
}

impl<F> DiagnosticHook for F
where
    F: Fn(ChannelPair, &Diagnostic) + Send + Sync + 'static,
{
    fn report(&self, channel: ChannelPair, diagnostic: &Diagnostic) {
        self(channel, diagnostic)
    }
}

/// Default hook: logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticHook for TracingDiagnostics {
    fn report(&self, channel: ChannelPair, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::UnmatchedReply { id } => {
                tracing::debug!(%channel, "dropping reply for unknown call id={}", id);
            }
            Diagnostic::HandlerFailed { id, method, error } => {
                tracing::debug!(%channel, "call id={} method={} failed: {}", id, method, error);
            }
            Diagnostic::MalformedMessage { reason } => {
                tracing::warn!(%channel, "dropping malformed message: {}", reason);
            }
            Diagnostic::ReplyEncodeFailed { id, reason } => {
                tracing::warn!(%channel, "failed to encode reply id={}: {}", id, reason);
            }
            Diagnostic::ReplyPostFailed { id, reason } => {
                tracing::warn!(%channel, "failed to post reply id={}: {}", id, reason);
            }
        }
    }
}

struct Shared {
    adapter: ChannelAdapter,
    pending: Mutex<HashMap<String, oneshot::Sender<ReplyEnvelope>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    config: RpcConfig,
    diagnostics: Arc<dyn DiagnosticHook>,
}

impl Shared {
    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.report(self.adapter.pair(), &diagnostic);
    }

    /// Hands a reply to its pending call. A reply breaking the exactly-one-of
    /// rule is reported as malformed but still resolves the call, error first.
    fn resolve(&self, reply: ReplyEnvelope) {
        if let Err(e) = reply.validate() {
            self.report(Diagnostic::MalformedMessage {
                reason: e.to_string(),
            });
        }
        let sender = self.pending.lock().remove(&reply.id);
        match sender {
            Some(tx) => {
                tracing::debug!("resolving call id={}", reply.id);
                // The caller may have gone away between removal and send.
                let _ = tx.send(reply);
            }
            None => self.report(Diagnostic::UnmatchedReply { id: reply.id }),
        }
    }

    fn send_reply(&self, id: String, outcome: Result<Value, RemoteError>) {
        let reply = match outcome {
            Ok(value) => ReplyEnvelope::ok(id.clone(), value),
            Err(err) => ReplyEnvelope::error(id.clone(), err),
        };

        let encoded = match Codec::encode_reply(&reply) {
            Ok(encoded) => encoded,
            Err(e) => {
                self.report(Diagnostic::ReplyEncodeFailed {
                    id: id.clone(),
                    reason: e.to_string(),
                });
                let fallback = RemoteError::internal(format!("failed to encode reply: {}", e));
                self.send_fallback(id, fallback);
                return;
            }
        };

        let size = encoded.len();
        match self.adapter.post(encoded) {
            Ok(()) => {}
            // A refused result fails the call for good.
            Err(TransportError::Protocol(e)) if reply.error.is_none() => {
                self.report(Diagnostic::ReplyPostFailed {
                    id: id.clone(),
                    reason: e.to_string(),
                });
                let mut fallback = RemoteError::internal(format!("reply too large to send: {}", e))
                    .with_detail("size", size);
                fallback.retryable = false;
                self.send_fallback(id, fallback);
            }
            Err(e) => self.report(Diagnostic::ReplyPostFailed {
                id,
                reason: e.to_string(),
            }),
        }
    }

    /// Posts an error reply in place of one that could not be delivered.
    fn send_fallback(&self, id: String, error: RemoteError) {
        let result = Codec::encode_reply(&ReplyEnvelope::error(id.clone(), error));
        match result {
            Ok(encoded) => {
                if let Err(e) = self.adapter.post(encoded) {
                    self.report(Diagnostic::ReplyPostFailed {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
            Err(e) => self.report(Diagnostic::ReplyEncodeFailed {
                id,
                reason: e.to_string(),
            }),
        }
    }

    /// Fails every outstanding call with `Closed` and frees the inbound claim.
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.adapter.release();
        let mut pending = self.pending.lock();
        if !pending.is_empty() {
            tracing::debug!("clearing {} pending calls", pending.len());
        }
        pending.clear();
    }
}

/// Removes a pending record when the call ends, however it ends.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(self.id);
    }
}

/// One end of a bidirectional RPC channel pair.
///
/// `L` is the local function table; `R` the peer's.
pub struct RpcCore<L: Service, R: Procedure> {
    shared: Arc<Shared>,
    dispatch: JoinHandle<()>,
    _marker: PhantomData<fn(R) -> L>,
}

impl<L: Service, R: Procedure> RpcCore<L, R> {
    /// Starts a core on `adapter`, serving `service`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(adapter: ChannelAdapter, service: L, config: RpcConfig) -> Result<Self, TransportError> {
        Self::spawn_with_diagnostics(adapter, service, config, TracingDiagnostics)
    }

    /// Starts a core reporting diagnostics to `hook`.
    pub fn spawn_with_diagnostics(
        adapter: ChannelAdapter,
        service: L,
        config: RpcConfig,
        hook: impl DiagnosticHook,
    ) -> Result<Self, TransportError> {
        let inbound = adapter.on()?;
        tracing::debug!("starting rpc core on {}", adapter.pair());

        let shared = Arc::new(Shared {
            adapter,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            config,
            diagnostics: Arc::new(hook),
        });

        let dispatch = tokio::spawn(dispatch_loop(shared.clone(), Arc::new(service), inbound));

        Ok(Self {
            shared,
            dispatch,
            _marker: PhantomData,
        })
    }

    /// Calls a remote operation and waits for its result.
    pub async fn call(&self, call: R) -> Result<Value, RpcError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(RpcError::Closed);
        }

        let method = call.method();
        let args = call.into_args()?;
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let encoded = Codec::encode_call(&CallEnvelope::new(id.clone(), method, args))?;

        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id.clone(), tx);
        let _guard = PendingGuard {
            shared: &self.shared,
            id: &id,
        };

        self.shared.adapter.post(encoded)?;
        tracing::debug!("sent call id={} method={}", id, method);

        let timeout = self.shared.config.call_timeout;
        let reply = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(RpcError::Closed),
            Err(_) => {
                tracing::debug!("call id={} method={} timed out", id, method);
                return Err(RpcError::Timeout {
                    method: method.to_string(),
                    after: timeout,
                });
            }
        };

        Ok(reply.into_outcome()?)
    }

    /// Calls a remote operation and decodes its result as `T`.
    pub async fn call_as<T: DeserializeOwned>(&self, call: R) -> Result<T, RpcError> {
        let method = call.method();
        let value = self.call(call).await?;
        serde_json::from_value(value).map_err(|e| RpcError::Decode {
            method: method.to_string(),
            reason: e.to_string(),
        })
    }

    /// Number of calls awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    pub fn channel(&self) -> ChannelPair {
        self.shared.adapter.pair()
    }

    pub fn config(&self) -> &RpcConfig {
        &self.shared.config
    }

    /// Returns whether the transport under this core has gone away.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl<L: Service, R: Procedure> Drop for RpcCore<L, R> {
    fn drop(&mut self) {
        self.dispatch.abort();
        self.shared.close();
    }
}

async fn dispatch_loop<L: Service>(shared: Arc<Shared>, service: Arc<L>, mut inbound: AdapterReceiver) {
    while let Some(payload) = inbound.recv().await {
        match Codec::decode(&payload) {
            Ok(Envelope::Reply(reply)) => shared.resolve(reply),
            Ok(Envelope::Call(call)) => {
                tokio::spawn(handle_call(shared.clone(), service.clone(), call));
            }
            Err(e) => shared.report(Diagnostic::MalformedMessage {
                reason: e.to_string(),
            }),
        }
    }
    tracing::debug!("inbound channel {} ended", shared.adapter.pair());
    shared.close();
}

async fn handle_call<L: Service>(shared: Arc<Shared>, service: Arc<L>, call: CallEnvelope) {
    let CallEnvelope { id, method, args } = call;
    tracing::debug!("handling call id={} method={}", id, method);

    let outcome = match L::Call::from_call(&method, args) {
        Err(e) => Err(RemoteError::from(e)),
        Ok(op) => {
            // Own task so a panicking handler surfaces as a JoinError.
            let handler = tokio::spawn(async move { service.handle(op).await });
            match handler.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(RemoteError::new(
                    ErrorCode::HandlerPanicked,
                    panic_message(e.into_panic()),
                )),
                Err(_) => Err(RemoteError::new(ErrorCode::Unavailable, "handler was cancelled")),
            }
        }
    };

    if let Err(error) = &outcome {
        shared.report(Diagnostic::HandlerFailed {
            id: id.clone(),
            method,
            error: error.clone(),
        });
    }
    shared.send_reply(id, outcome);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::StreamLink;
    use crate::memory::MemoryHub;
    use crate::service::{reply, NoService};
    use crate::transport::{PeerId, Transport};
    use async_trait::async_trait;
    use serde_json::json;
    use tether_protocol::{Args, NoProcedures, ProtocolError, MAX_PAYLOAD_SIZE};

    const PAIR: ChannelPair = ChannelPair::new("to-window", "to-host");

    #[derive(Debug, Clone, PartialEq)]
    enum MathCall {
        Add(i64, i64),
        Sleep(u64),
        Fail(String),
        Repeat(u64),
        Panic,
    }

    impl Procedure for MathCall {
        fn method(&self) -> &'static str {
            match self {
                MathCall::Add(..) => "add",
                MathCall::Sleep(_) => "sleep",
                MathCall::Fail(_) => "fail",
                MathCall::Repeat(_) => "repeat",
                MathCall::Panic => "panic",
            }
        }

        fn into_args(self) -> Result<Vec<Value>, ProtocolError> {
            Ok(match self {
                MathCall::Add(a, b) => vec![json!(a), json!(b)],
                MathCall::Sleep(ms) => vec![json!(ms)],
                MathCall::Fail(msg) => vec![json!(msg)],
                MathCall::Repeat(n) => vec![json!(n)],
                MathCall::Panic => vec![],
            })
        }

        fn from_call(method: &str, args: Vec<Value>) -> Result<Self, ProtocolError> {
            let mut args = Args::new(method, args);
            match method {
                "add" => Ok(MathCall::Add(args.next()?, args.next()?)),
                "sleep" => Ok(MathCall::Sleep(args.next()?)),
                "fail" => Ok(MathCall::Fail(args.next()?)),
                "repeat" => Ok(MathCall::Repeat(args.next()?)),
                "panic" => Ok(MathCall::Panic),
                other => Err(ProtocolError::UnknownMethod(other.to_string())),
            }
        }
    }

    struct Math;

    #[async_trait]
    impl Service for Math {
        type Call = MathCall;

        async fn handle(&self, call: MathCall) -> Result<Value, RemoteError> {
            match call {
                MathCall::Add(a, b) => reply(&(a + b)),
                MathCall::Sleep(ms) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    reply(&ms)
                }
                MathCall::Fail(msg) => Err(RemoteError::handler_failed(msg)),
                MathCall::Repeat(n) => reply(&"x".repeat(n as usize)),
                MathCall::Panic => panic!("boom"),
            }
        }
    }

    type HostCore = RpcCore<Math, NoProcedures>;
    type WindowCore = RpcCore<NoService, MathCall>;

    fn connect(timeout: Duration) -> (MemoryHub, HostCore, WindowCore) {
        let hub = MemoryHub::new();
        let window = hub.open_window();
        let host = RpcCore::spawn(
            ChannelAdapter::new(Arc::new(hub.host_port(window.id())), PAIR).bound_to(window.id()),
            Math,
            RpcConfig::host(),
        )
        .unwrap();
        let client = RpcCore::spawn(
            ChannelAdapter::new(Arc::new(window), PAIR.reversed()),
            NoService,
            RpcConfig::renderer().with_call_timeout(timeout),
        )
        .unwrap();
        (hub, host, client)
    }

    #[tokio::test]
    async fn test_call_resolves() {
        let (_hub, _host, client) = connect(Duration::from_secs(5));
        let sum: i64 = client.call_as(MathCall::Add(2, 3)).await.unwrap();
        assert_eq!(sum, 5);
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_calls_match_their_own_replies() {
        let (_hub, _host, client) = connect(Duration::from_secs(5));
        let client = Arc::new(client);

        // Later calls finish first, so replies arrive in reverse order.
        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let client = client.clone();
                tokio::spawn(async move { client.call_as::<u64>(MathCall::Sleep(80 - i * 10)).await })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap().unwrap(), 80 - i as u64 * 10);
        }
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_handler_error_becomes_rejection() {
        let (_hub, _host, client) = connect(Duration::from_secs(5));
        let err = client.call(MathCall::Fail("no luck".into())).await.unwrap_err();
        match err {
            RpcError::Remote(remote) => {
                assert_eq!(remote.code, ErrorCode::HandlerFailed);
                assert_eq!(remote.message, "no luck");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_rejection() {
        let (_hub, _host, client) = connect(Duration::from_secs(5));
        let err = client.call(MathCall::Panic).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::HandlerPanicked));
        assert!(err.to_string().contains("boom"));

        // The host keeps serving.
        let sum: i64 = client.call_as(MathCall::Add(1, 1)).await.unwrap();
        assert_eq!(sum, 2);
    }

    #[tokio::test]
    async fn test_timeout_rejects_once_and_late_reply_is_dropped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hub = MemoryHub::new();
        let window = hub.open_window();
        let _host: HostCore = RpcCore::spawn(
            ChannelAdapter::new(Arc::new(hub.host_port(window.id())), PAIR),
            Math,
            RpcConfig::host(),
        )
        .unwrap();
        let sink = seen.clone();
        let client: WindowCore = RpcCore::spawn_with_diagnostics(
            ChannelAdapter::new(Arc::new(window), PAIR.reversed()),
            NoService,
            RpcConfig::new(Duration::from_millis(30)),
            move |_: ChannelPair, d: &Diagnostic| sink.lock().push(d.clone()),
        )
        .unwrap();

        let err = client.call(MathCall::Sleep(150)).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(client.pending_count(), 0);

        tokio::time::sleep(Duration::from_millis(250)).await;
        let seen = seen.lock();
        assert_eq!(
            seen.as_slice(),
            &[Diagnostic::UnmatchedReply { id: "1".into() }]
        );
    }

    #[tokio::test]
    async fn test_unknown_method_and_bad_args_rejected() {
        let hub = MemoryHub::new();
        let window = hub.open_window();
        let _host: HostCore = RpcCore::spawn(
            ChannelAdapter::new(Arc::new(hub.host_port(window.id())), PAIR),
            Math,
            RpcConfig::host(),
        )
        .unwrap();
        let mut replies = window.on(PAIR.outbound).unwrap();

        window
            .send(PAIR.inbound, r#"{"id":"a","method":"divide","args":[]}"#.into())
            .unwrap();
        let reply = match Codec::decode(&replies.recv().await.unwrap().payload).unwrap() {
            Envelope::Reply(reply) => reply,
            other => panic!("expected reply, got {:?}", other),
        };
        assert_eq!(reply.error.unwrap().code, ErrorCode::UnknownMethod);

        window
            .send(PAIR.inbound, r#"{"id":"b","method":"add","args":["x"]}"#.into())
            .unwrap();
        let reply = match Codec::decode(&replies.recv().await.unwrap().payload).unwrap() {
            Envelope::Reply(reply) => reply,
            other => panic!("expected reply, got {:?}", other),
        };
        assert_eq!(reply.id, "b");
        assert_eq!(reply.error.unwrap().code, ErrorCode::InvalidArguments);
    }

    #[tokio::test]
    async fn test_malformed_input_does_not_stop_dispatch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hub = MemoryHub::new();
        let window = hub.open_window();
        let sink = seen.clone();
        let _host: HostCore = RpcCore::spawn_with_diagnostics(
            ChannelAdapter::new(Arc::new(hub.host_port(window.id())), PAIR),
            Math,
            RpcConfig::host(),
            move |_: ChannelPair, d: &Diagnostic| sink.lock().push(d.clone()),
        )
        .unwrap();

        window.send(PAIR.inbound, "not json".into()).unwrap();
        window.send(PAIR.inbound, r#"{"method":"add"}"#.into()).unwrap();

        let client: WindowCore = RpcCore::spawn(
            ChannelAdapter::new(Arc::new(window), PAIR.reversed()),
            NoService,
            RpcConfig::renderer(),
        )
        .unwrap();
        let sum: i64 = client.call_as(MathCall::Add(4, 4)).await.unwrap();
        assert_eq!(sum, 8);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen
            .iter()
            .all(|d| matches!(d, Diagnostic::MalformedMessage { .. })));
    }

    #[tokio::test]
    async fn test_dropped_call_removes_pending_record() {
        let (_hub, _host, client) = connect(Duration::from_secs(5));
        let mut call = tokio_test::task::spawn(client.call(MathCall::Sleep(200)));
        tokio_test::assert_pending!(call.poll());
        assert_eq!(client.pending_count(), 1);

        drop(call);
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_disjoint_inbound_names_are_isolated() {
        let hub = MemoryHub::new();
        let window = hub.open_window();
        let port: Arc<dyn Transport> = Arc::new(hub.host_port(window.id()));
        let a_pair = ChannelPair::new("a-out", "a-in");
        let b_pair = ChannelPair::new("b-out", "b-in");
        let hits = Arc::new(Mutex::new(Vec::new()));

        let sink = hits.clone();
        let _a: HostCore = RpcCore::spawn_with_diagnostics(
            ChannelAdapter::new(port.clone(), a_pair),
            Math,
            RpcConfig::host(),
            move |pair: ChannelPair, _: &Diagnostic| sink.lock().push(pair.inbound),
        )
        .unwrap();
        let sink = hits.clone();
        let _b: HostCore = RpcCore::spawn_with_diagnostics(
            ChannelAdapter::new(port, b_pair),
            Math,
            RpcConfig::host(),
            move |pair: ChannelPair, _: &Diagnostic| sink.lock().push(pair.inbound),
        )
        .unwrap();

        let window: Arc<dyn Transport> = Arc::new(window);
        let client: WindowCore =
            RpcCore::spawn(ChannelAdapter::new(window, a_pair.reversed()), NoService, RpcConfig::renderer())
                .unwrap();
        let err = client.call(MathCall::Fail("only a".into())).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::HandlerFailed));

        assert_eq!(hits.lock().as_slice(), &["a-in"]);
    }

    #[tokio::test]
    async fn test_closed_transport_fails_pending_calls() {
        let (hub, _host, client) = connect(Duration::from_secs(5));
        let window_id = PeerId(1);
        assert!(hub.is_open(window_id));
        let call = client.call(MathCall::Sleep(500));
        let closer = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            hub.close_window(window_id);
        };
        let (result, _) = tokio::join!(call, closer);
        assert!(matches!(result, Err(RpcError::Closed)));
        assert!(client.is_closed());
        assert!(matches!(client.call(MathCall::Add(1, 2)).await, Err(RpcError::Closed)));
    }

    #[tokio::test]
    async fn test_oversized_reply_rejects_without_timeout() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let (ar, aw) = tokio::io::split(a);
        let (br, bw) = tokio::io::split(b);
        let host_link: Arc<dyn Transport> = Arc::new(StreamLink::new(ar, aw, PeerId(1)));
        let window_link: Arc<dyn Transport> = Arc::new(StreamLink::new(br, bw, PeerId::HOST));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _host: HostCore = RpcCore::spawn_with_diagnostics(
            ChannelAdapter::new(host_link, PAIR),
            Math,
            RpcConfig::host(),
            move |_: ChannelPair, d: &Diagnostic| sink.lock().push(d.clone()),
        )
        .unwrap();
        let client: WindowCore = RpcCore::spawn(
            ChannelAdapter::new(window_link, PAIR.reversed()),
            NoService,
            RpcConfig::renderer().with_call_timeout(Duration::from_secs(30)),
        )
        .unwrap();

        let started = tokio::time::Instant::now();
        let err = client
            .call(MathCall::Repeat(MAX_PAYLOAD_SIZE as u64 + 1))
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!err.is_timeout());
        assert!(!err.is_retryable());
        match err {
            RpcError::Remote(remote) => {
                assert_eq!(remote.code, ErrorCode::InternalError);
                assert!(remote.detail("size").is_some());
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(seen
            .lock()
            .iter()
            .any(|d| matches!(d, Diagnostic::ReplyPostFailed { .. })));

        // The link survives.
        let sum: i64 = client.call_as(MathCall::Add(1, 2)).await.unwrap();
        assert_eq!(sum, 3);
    }

    #[tokio::test]
    async fn test_reply_with_result_and_error_resolves_as_error() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hub = MemoryHub::new();
        let window = hub.open_window();
        let port = hub.host_port(window.id());
        let mut calls = port.on(PAIR.inbound).unwrap();

        let sink = seen.clone();
        let client: WindowCore = RpcCore::spawn_with_diagnostics(
            ChannelAdapter::new(Arc::new(window), PAIR.reversed()),
            NoService,
            RpcConfig::renderer(),
            move |_: ChannelPair, d: &Diagnostic| sink.lock().push(d.clone()),
        )
        .unwrap();

        let answer = async {
            let inbound = calls.recv().await.unwrap();
            let id = Codec::decode(&inbound.payload).unwrap().id().to_string();
            let both = ReplyEnvelope {
                id,
                result: Some(json!(5)),
                error: Some(RemoteError::handler_failed("both set")),
            };
            port.send(PAIR.outbound, serde_json::to_string(&both).unwrap())
                .unwrap();
        };
        let (result, _) = tokio::join!(client.call(MathCall::Add(2, 3)), answer);

        let err = result.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::HandlerFailed));
        assert!(seen
            .lock()
            .iter()
            .any(|d| matches!(d, Diagnostic::MalformedMessage { .. })));
    }
}
