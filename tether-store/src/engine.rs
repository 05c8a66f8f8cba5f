//! Storage engine seam.

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tether_protocol::endpoint::database::{ChatMessage, Model};

/// Record storage behind the store façade.
///
/// Calls are synchronous; the façade runs them off the async executor.
/// Each method is atomic with respect to the others.
pub trait StorageEngine: Send + Sync + 'static {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    fn models(&self) -> Result<Vec<Model>, StorageError>;

    fn insert_model(&self, model: Model) -> Result<(), StorageError>;

    /// Applies `update` to the model in place. Returns `false` if absent.
    fn update_model(&self, id: &str, update: &mut dyn FnMut(&mut Model)) -> Result<bool, StorageError>;

    /// Returns `false` if absent.
    fn delete_model(&self, id: &str) -> Result<bool, StorageError>;

    fn prompt(&self, key: &str) -> Result<Option<Value>, StorageError>;

    fn set_prompt(&self, key: &str, value: Value) -> Result<(), StorageError>;

    fn append_chat_message(&self, message: ChatMessage) -> Result<(), StorageError>;

    /// All messages stored for a model, in insertion order.
    fn chat_history(&self, model_id: &str) -> Result<Vec<ChatMessage>, StorageError>;
}

/// Shipped engine implementations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Memory,
    #[default]
    File,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Memory => write!(f, "memory"),
            EngineKind::File => write!(f, "file"),
        }
    }
}

impl FromStr for EngineKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(EngineKind::Memory),
            "file" | "json" => Ok(EngineKind::File),
            other => Err(StorageError::UnknownEngine(other.to_string())),
        }
    }
}
