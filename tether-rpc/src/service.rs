//! Local function tables.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tether_protocol::{Codec, NoProcedures, Procedure, RemoteError};

/// The functions one side exposes on a channel pair.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Operations this service accepts.
    type Call: Procedure;

    /// Handles one decoded call. `Err` becomes an error reply.
    async fn handle(&self, call: Self::Call) -> Result<Value, RemoteError>;
}

#[async_trait]
impl<S: Service> Service for Arc<S> {
    type Call = S::Call;

    async fn handle(&self, call: Self::Call) -> Result<Value, RemoteError> {
        (**self).handle(call).await
    }
}

/// A service exposing nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoService;

#[async_trait]
impl Service for NoService {
    type Call = NoProcedures;

    async fn handle(&self, call: NoProcedures) -> Result<Value, RemoteError> {
        match call {}
    }
}

/// Encodes a handler's return value.
pub fn reply<T: Serialize>(value: &T) -> Result<Value, RemoteError> {
    Codec::to_value(value).map_err(|e| RemoteError::internal(format!("failed to encode result: {}", e)))
}
