//! Checksummed JSON file engine.
//!
//! The whole store is one JSON document. The file starts with the document's
//! CRC32C as eight hex digits on its own line:
//!
//! ```text
//! 1c291ca3
//! {"models":{...},"prompts":{...},"chatHistory":[...]}
//! ```
//!
//! Writes go to a temporary file which is synced and then renamed over the
//! store, so a reader never observes a half-written document.

use crate::engine::StorageEngine;
use crate::error::StorageError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tether_protocol::endpoint::database::{ChatMessage, Model};

/// File name of the store document inside the data directory.
pub const STORE_FILE: &str = "store.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default)]
    models: BTreeMap<String, Model>,
    #[serde(default)]
    prompts: BTreeMap<String, Value>,
    #[serde(default)]
    chat_history: Vec<ChatMessage>,
}

/// Engine persisting every mutation to a single file.
pub struct FileEngine {
    path: PathBuf,
    doc: RwLock<Document>,
}

impl FileEngine {
    /// Opens or creates a store in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(STORE_FILE);

        let doc = if path.exists() {
            let doc = Self::load(&path)?;
            tracing::info!(
                "Opened store {} ({} models, {} prompts, {} chat messages)",
                path.display(),
                doc.models.len(),
                doc.prompts.len(),
                doc.chat_history.len()
            );
            doc
        } else {
            tracing::info!("Creating new store at {}", path.display());
            Document::default()
        };

        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<Document, StorageError> {
        let data = fs::read(path)?;
        let split = data
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| StorageError::Corruption(format!("{}: missing checksum", path.display())))?;
        let (header, body) = (&data[..split], &data[split + 1..]);

        let expected = std::str::from_utf8(header)
            .ok()
            .and_then(|h| u32::from_str_radix(h.trim(), 16).ok())
            .ok_or_else(|| StorageError::Corruption(format!("{}: unreadable checksum", path.display())))?;
        let actual = crc32c::crc32c(body);
        if actual != expected {
            return Err(StorageError::Corruption(format!(
                "{}: checksum mismatch (expected {:08x}, got {:08x})",
                path.display(),
                expected,
                actual
            )));
        }

        Ok(serde_json::from_slice(body)?)
    }

    fn persist(&self, doc: &Document) -> Result<(), StorageError> {
        let body = serde_json::to_vec(doc)?;
        let checksum = crc32c::crc32c(&body);

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            writeln!(file, "{:08x}", checksum)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        tracing::debug!("Persisted store ({} bytes)", body.len());
        Ok(())
    }

    /// Applies a mutation to a copy of the document, persists it, then
    /// publishes it. On failure the in-memory state is left untouched.
    fn mutate<T>(&self, f: impl FnOnce(&mut Document) -> T) -> Result<T, StorageError> {
        let mut doc = self.doc.write();
        let mut next = doc.clone();
        let out = f(&mut next);
        self.persist(&next)?;
        *doc = next;
        Ok(out)
    }
}

impl StorageEngine for FileEngine {
    fn name(&self) -> &'static str {
        "file"
    }

    fn models(&self) -> Result<Vec<Model>, StorageError> {
        Ok(self.doc.read().models.values().cloned().collect())
    }

    fn insert_model(&self, model: Model) -> Result<(), StorageError> {
        self.mutate(|doc| {
            doc.models.insert(model.id.clone(), model);
        })
    }

    fn update_model(&self, id: &str, update: &mut dyn FnMut(&mut Model)) -> Result<bool, StorageError> {
        if !self.doc.read().models.contains_key(id) {
            return Ok(false);
        }
        self.mutate(|doc| match doc.models.get_mut(id) {
            Some(model) => {
                update(model);
                true
            }
            None => false,
        })
    }

    fn delete_model(&self, id: &str) -> Result<bool, StorageError> {
        if !self.doc.read().models.contains_key(id) {
            return Ok(false);
        }
        self.mutate(|doc| doc.models.remove(id).is_some())
    }

    fn prompt(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.doc.read().prompts.get(key).cloned())
    }

    fn set_prompt(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.mutate(|doc| {
            doc.prompts.insert(key.to_string(), value);
        })
    }

    fn append_chat_message(&self, message: ChatMessage) -> Result<(), StorageError> {
        self.mutate(|doc| doc.chat_history.push(message))
    }

    fn chat_history(&self, model_id: &str) -> Result<Vec<ChatMessage>, StorageError> {
        Ok(self
            .doc
            .read()
            .chat_history
            .iter()
            .filter(|m| m.model_id == model_id)
            .cloned()
            .collect())
    }
}
