//! In-memory engine.

use crate::engine::StorageEngine;
use crate::error::StorageError;
use dashmap::DashMap;
use serde_json::Value;
use tether_protocol::endpoint::database::{ChatMessage, Model};

/// Volatile engine for tests and headless runs.
#[derive(Default)]
pub struct MemoryEngine {
    models: DashMap<String, Model>,
    prompts: DashMap<String, Value>,
    chats: DashMap<String, Vec<ChatMessage>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn models(&self) -> Result<Vec<Model>, StorageError> {
        Ok(self.models.iter().map(|m| m.value().clone()).collect())
    }

    fn insert_model(&self, model: Model) -> Result<(), StorageError> {
        self.models.insert(model.id.clone(), model);
        Ok(())
    }

    fn update_model(&self, id: &str, update: &mut dyn FnMut(&mut Model)) -> Result<bool, StorageError> {
        match self.models.get_mut(id) {
            Some(mut model) => {
                update(model.value_mut());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_model(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.models.remove(id).is_some())
    }

    fn prompt(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.prompts.get(key).map(|v| v.value().clone()))
    }

    fn set_prompt(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.prompts.insert(key.to_string(), value);
        Ok(())
    }

    fn append_chat_message(&self, message: ChatMessage) -> Result<(), StorageError> {
        self.chats
            .entry(message.model_id.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    fn chat_history(&self, model_id: &str) -> Result<Vec<ChatMessage>, StorageError> {
        Ok(self
            .chats
            .get(model_id)
            .map(|c| c.value().clone())
            .unwrap_or_default())
    }
}
