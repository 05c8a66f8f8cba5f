//! Async store façade.

use crate::engine::{EngineKind, StorageEngine};
use crate::error::StorageError;
use crate::file::FileEngine;
use crate::memory::MemoryEngine;
use chrono::Utc;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tether_protocol::endpoint::database::{ChatMessage, Model, ModelFields, ModelPatch};

/// Models, prompts and chat history behind a pluggable engine.
///
/// Cheap to clone. Concurrent operations may interleave; each single
/// operation is atomic.
#[derive(Clone)]
pub struct Store {
    engine: Arc<dyn StorageEngine>,
}

impl Store {
    pub fn new(engine: impl StorageEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Volatile store.
    pub fn in_memory() -> Self {
        Self::new(MemoryEngine::new())
    }

    /// Opens the engine of the given kind. `dir` is ignored by the memory engine.
    pub fn open(kind: EngineKind, dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let store = match kind {
            EngineKind::Memory => Self::in_memory(),
            EngineKind::File => Self::new(FileEngine::open(dir)?),
        };
        tracing::info!("Store opened with {} engine", store.engine.name());
        Ok(store)
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn StorageEngine) -> Result<T, StorageError> + Send + 'static,
    {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || op(engine.as_ref()))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }

    /// All models, oldest first.
    pub async fn get_models(&self) -> Result<Vec<Model>, StorageError> {
        let mut models = self.run(|engine| engine.models()).await?;
        models.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(models)
    }

    /// Stores a new model and returns its generated id.
    pub async fn add_model(&self, fields: ModelFields) -> Result<String, StorageError> {
        let id = uuid::Uuid::new_v4().to_string();
        let model = Model::from_fields(id.clone(), fields, Utc::now());
        self.run(move |engine| engine.insert_model(model)).await?;
        tracing::debug!("Added model {}", id);
        Ok(id)
    }

    /// Merges `patch` into an existing model, keeping its id and creation time.
    pub async fn update_model(&self, id: &str, patch: ModelPatch) -> Result<(), StorageError> {
        let id = id.to_string();
        self.run(move |engine| {
            let mut patch = Some(patch);
            let found = engine.update_model(&id, &mut |model: &mut Model| {
                if let Some(patch) = patch.take() {
                    model.apply(patch, Utc::now());
                }
            })?;
            if found {
                Ok(())
            } else {
                Err(StorageError::ModelNotFound(id))
            }
        })
        .await
    }

    /// Deletes a model. Deleting an absent model is not an error.
    pub async fn delete_model(&self, id: &str) -> Result<(), StorageError> {
        let id = id.to_string();
        let removed = self.run(move |engine| engine.delete_model(&id)).await?;
        if !removed {
            tracing::debug!("delete of absent model ignored");
        }
        Ok(())
    }

    pub async fn get_prompts(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let key = key.to_string();
        self.run(move |engine| engine.prompt(&key)).await
    }

    pub async fn set_prompts(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let key = key.to_string();
        self.run(move |engine| engine.set_prompt(&key, value)).await
    }

    /// Records a chat exchange and returns its id.
    pub async fn add_chat_message(
        &self,
        model_id: &str,
        message: String,
        response: Option<String>,
    ) -> Result<String, StorageError> {
        let entry = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            model_id: model_id.to_string(),
            message,
            response,
            timestamp: Utc::now(),
        };
        let id = entry.id.clone();
        self.run(move |engine| engine.append_chat_message(entry)).await?;
        Ok(id)
    }

    /// Chat history of one model, oldest first.
    pub async fn get_chat_history(&self, model_id: &str) -> Result<Vec<ChatMessage>, StorageError> {
        let model_id = model_id.to_string();
        let mut history = self.run(move |engine| engine.chat_history(&model_id)).await?;
        // Stable sort keeps insertion order for equal timestamps.
        history.sort_by_key(|m| m.timestamp);
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn stores() -> (TempDir, Vec<Store>) {
        let dir = TempDir::new().unwrap();
        let file = Store::open(EngineKind::File, dir.path()).unwrap();
        (dir, vec![Store::in_memory(), file])
    }

    #[tokio::test]
    async fn test_model_lifecycle() {
        let (_dir, stores) = stores();
        for store in stores {
            let id = store.add_model(ModelFields::named("Llama")).await.unwrap();
            let before = store.get_models().await.unwrap();
            assert_eq!(before.len(), 1);
            assert_eq!(before[0].id, id);
            assert!(before[0].updated_at.is_none());

            store.update_model(&id, ModelPatch::name("Mistral")).await.unwrap();
            let after = store.get_models().await.unwrap();
            assert_eq!(after[0].name, "Mistral");
            assert_eq!(after[0].id, id);
            assert_eq!(after[0].created_at, before[0].created_at);
            assert!(after[0].updated_at.is_some());

            store.delete_model(&id).await.unwrap();
            assert!(store.get_models().await.unwrap().is_empty());
            store.delete_model(&id).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_update_missing_model() {
        let (_dir, stores) = stores();
        for store in stores {
            let err = store
                .update_model("missing-id", ModelPatch::name("x"))
                .await
                .unwrap_err();
            assert!(err.is_not_found());
            assert_eq!(err.to_string(), "Model with id missing-id not found");
        }
    }

    #[tokio::test]
    async fn test_prompts() {
        let (_dir, stores) = stores();
        for store in stores {
            assert_eq!(store.get_prompts("system").await.unwrap(), None);
            store.set_prompts("system", json!(["a", "b"])).await.unwrap();
            store.set_prompts("system", json!(["c"])).await.unwrap();
            assert_eq!(store.get_prompts("system").await.unwrap(), Some(json!(["c"])));
        }
    }

    #[tokio::test]
    async fn test_chat_history_is_per_model_and_ordered() {
        let (_dir, stores) = stores();
        for store in stores {
            store.add_chat_message("m-1", "hi".into(), Some("hello".into())).await.unwrap();
            store.add_chat_message("m-2", "other".into(), None).await.unwrap();
            store.add_chat_message("m-1", "bye".into(), None).await.unwrap();

            let history = store.get_chat_history("m-1").await.unwrap();
            let messages: Vec<_> = history.iter().map(|m| m.message.as_str()).collect();
            assert_eq!(messages, vec!["hi", "bye"]);
            assert_eq!(history[0].response.as_deref(), Some("hello"));
            assert!(store.get_chat_history("m-3").await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_concurrent_adds() {
        let store = Store::in_memory();
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.add_model(ModelFields::named(format!("m{}", i))).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.get_models().await.unwrap().len(), 16);
    }
}
