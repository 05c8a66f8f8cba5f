//! Database endpoint over the local store.

use crate::error::remote;
use async_trait::async_trait;
use serde_json::Value;
use tether_protocol::endpoint::database::DatabaseCall;
use tether_protocol::RemoteError;
use tether_rpc::{reply, Service};
use tether_store::Store;

/// Serves the database channel from a [`Store`].
#[derive(Clone)]
pub struct DatabaseService {
    store: Store,
}

impl DatabaseService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

#[async_trait]
impl Service for DatabaseService {
    type Call = DatabaseCall;

    async fn handle(&self, call: DatabaseCall) -> Result<Value, RemoteError> {
        match call {
            DatabaseCall::GetModels => reply(&self.store.get_models().await.map_err(remote)?),
            DatabaseCall::AddModel(fields) => reply(&self.store.add_model(fields).await.map_err(remote)?),
            DatabaseCall::UpdateModel { id, patch } => {
                self.store.update_model(&id, patch).await.map_err(remote)?;
                Ok(Value::Null)
            }
            DatabaseCall::DeleteModel(id) => {
                self.store.delete_model(&id).await.map_err(remote)?;
                Ok(Value::Null)
            }
            DatabaseCall::GetPrompts(key) => reply(&self.store.get_prompts(&key).await.map_err(remote)?),
            DatabaseCall::SetPrompts { key, value } => {
                self.store.set_prompts(&key, value).await.map_err(remote)?;
                Ok(Value::Null)
            }
            DatabaseCall::AddChatMessage {
                model_id,
                message,
                response,
            } => {
                let id = self
                    .store
                    .add_chat_message(&model_id, message, response)
                    .await
                    .map_err(remote)?;
                reply(&id)
            }
            DatabaseCall::GetChatHistory(model_id) => {
                reply(&self.store.get_chat_history(&model_id).await.map_err(remote)?)
            }
        }
    }
}
