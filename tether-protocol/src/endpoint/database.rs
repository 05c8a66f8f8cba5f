//! Database endpoint: models, prompts and chat history.

use super::ChannelPair;
use crate::error::ProtocolError;
use crate::procedure::{arg, Args, Procedure};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const HOST: ChannelPair = ChannelPair::new("database-to-renderer", "database-to-main");
pub const RENDERER: ChannelPair = HOST.reversed();

/// A stored model record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "imageURI", skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
    #[serde(default, rename = "modelURI", skip_serializing_if = "Option::is_none")]
    pub model_uri: Option<String>,
    #[serde(default, rename = "loraURI", skip_serializing_if = "Option::is_none")]
    pub lora_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Creates a record from caller-supplied fields.
    pub fn from_fields(id: String, fields: ModelFields, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: fields.name,
            description: fields.description,
            image_uri: fields.image_uri,
            model_uri: fields.model_uri,
            lora_uri: fields.lora_uri,
            config: fields.config,
            created_at,
            updated_at: None,
        }
    }

    /// Merges a patch. `id` and `created_at` never change.
    pub fn apply(&mut self, patch: ModelPatch, now: DateTime<Utc>) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if patch.description.is_some() {
            self.description = patch.description;
        }
        if patch.image_uri.is_some() {
            self.image_uri = patch.image_uri;
        }
        if patch.model_uri.is_some() {
            self.model_uri = patch.model_uri;
        }
        if patch.lora_uri.is_some() {
            self.lora_uri = patch.lora_uri;
        }
        if patch.config.is_some() {
            self.config = patch.config;
        }
        self.updated_at = Some(now);
    }
}

/// Fields supplied by `addModel`; the store assigns `id` and `createdAt`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelFields {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "imageURI", skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
    #[serde(default, rename = "modelURI", skip_serializing_if = "Option::is_none")]
    pub model_uri: Option<String>,
    #[serde(default, rename = "loraURI", skip_serializing_if = "Option::is_none")]
    pub lora_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

impl ModelFields {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Partial update for `updateModel`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "imageURI", skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
    #[serde(default, rename = "modelURI", skip_serializing_if = "Option::is_none")]
    pub model_uri: Option<String>,
    #[serde(default, rename = "loraURI", skip_serializing_if = "Option::is_none")]
    pub lora_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

impl ModelPatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// A stored chat exchange for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub model_id: String,
    pub message: String,
    #[serde(default)]
    pub response: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Operations served by the host on the database channel.
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseCall {
    GetModels,
    AddModel(ModelFields),
    UpdateModel { id: String, patch: ModelPatch },
    DeleteModel(String),
    GetPrompts(String),
    SetPrompts { key: String, value: Value },
    AddChatMessage {
        model_id: String,
        message: String,
        response: Option<String>,
    },
    GetChatHistory(String),
}

impl Procedure for DatabaseCall {
    fn method(&self) -> &'static str {
        match self {
            DatabaseCall::GetModels => "getModels",
            DatabaseCall::AddModel(_) => "addModel",
            DatabaseCall::UpdateModel { .. } => "updateModel",
            DatabaseCall::DeleteModel(_) => "deleteModel",
            DatabaseCall::GetPrompts(_) => "getPrompts",
            DatabaseCall::SetPrompts { .. } => "setPrompts",
            DatabaseCall::AddChatMessage { .. } => "addChatMessage",
            DatabaseCall::GetChatHistory(_) => "getChatHistory",
        }
    }

    fn into_args(self) -> Result<Vec<Value>, ProtocolError> {
        Ok(match self {
            DatabaseCall::GetModels => Vec::new(),
            DatabaseCall::AddModel(fields) => vec![arg(&fields)?],
            DatabaseCall::UpdateModel { id, patch } => vec![Value::String(id), arg(&patch)?],
            DatabaseCall::DeleteModel(id) => vec![Value::String(id)],
            DatabaseCall::GetPrompts(key) => vec![Value::String(key)],
            DatabaseCall::SetPrompts { key, value } => vec![Value::String(key), value],
            DatabaseCall::AddChatMessage {
                model_id,
                message,
                response,
            } => vec![Value::String(model_id), Value::String(message), arg(&response)?],
            DatabaseCall::GetChatHistory(model_id) => vec![Value::String(model_id)],
        })
    }

    fn from_call(method: &str, args: Vec<Value>) -> Result<Self, ProtocolError> {
        let mut args = Args::new(method, args);
        match method {
            "getModels" => Ok(DatabaseCall::GetModels),
            "addModel" => Ok(DatabaseCall::AddModel(args.next()?)),
            "updateModel" => Ok(DatabaseCall::UpdateModel {
                id: args.next()?,
                patch: args.next_or_default()?,
            }),
            "deleteModel" => Ok(DatabaseCall::DeleteModel(args.next()?)),
            "getPrompts" => Ok(DatabaseCall::GetPrompts(args.next()?)),
            "setPrompts" => Ok(DatabaseCall::SetPrompts {
                key: args.next()?,
                value: args.next()?,
            }),
            "addChatMessage" => Ok(DatabaseCall::AddChatMessage {
                model_id: args.next()?,
                message: args.next()?,
                response: args.next()?,
            }),
            "getChatHistory" => Ok(DatabaseCall::GetChatHistory(args.next()?)),
            other => Err(ProtocolError::UnknownMethod(other.to_string())),
        }
    }
}
