//! Model control endpoint.
//!
//! The host serves [`LlmCall`]; the renderer serves [`LlmRendererCall`] on the
//! same channel pair so the host can push state snapshots back.

use super::ChannelPair;
use crate::error::ProtocolError;
use crate::procedure::{arg, Args, Procedure};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const HOST: ChannelPair = ChannelPair::new("llmRpc", "llmRpc");
pub const RENDERER: ChannelPair = HOST.reversed();

/// Load status of the selected model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    pub loaded: bool,
    pub load_progress: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Who produced a chat item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatItemKind {
    User,
    Model,
}

/// One turn of the simplified chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatItem {
    #[serde(rename = "type")]
    pub kind: ChatItemKind,
    pub message: String,
}

/// Text the user is composing, with the engine's suggested completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftPrompt {
    pub prompt: String,
    pub completion: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub loaded: bool,
    pub generating_result: bool,
    pub simplified_chat: Vec<ChatItem>,
    pub draft_prompt: DraftPrompt,
}

/// Snapshot of the host's model state, pushed to the renderer on every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default)]
    pub selected_model_file_path: Option<String>,
    pub model: ModelStatus,
    pub chat_session: ChatSession,
}

impl LlmState {
    /// Returns the first error recorded on the model.
    pub fn error(&self) -> Option<&str> {
        self.model.error.as_deref()
    }

    /// True while a model is selected but not ready.
    pub fn is_loading(&self) -> bool {
        self.selected_model_file_path.is_some()
            && self.model.error.is_none()
            && !(self.model.loaded && self.chat_session.loaded)
    }
}

/// Operations served by the host on the model control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmCall {
    SelectModelFileAndLoad,
    LoadSelectedModel(String),
    Prompt(String),
    StopActivePrompt,
    ResetChatHistory,
    SetDraftPrompt(String),
}

impl Procedure for LlmCall {
    fn method(&self) -> &'static str {
        match self {
            LlmCall::SelectModelFileAndLoad => "selectModelFileAndLoad",
            LlmCall::LoadSelectedModel(_) => "loadSelectedModel",
            LlmCall::Prompt(_) => "prompt",
            LlmCall::StopActivePrompt => "stopActivePrompt",
            LlmCall::ResetChatHistory => "resetChatHistory",
            LlmCall::SetDraftPrompt(_) => "setDraftPrompt",
        }
    }

    fn into_args(self) -> Result<Vec<Value>, ProtocolError> {
        match self {
            LlmCall::LoadSelectedModel(text)
            | LlmCall::Prompt(text)
            | LlmCall::SetDraftPrompt(text) => Ok(vec![Value::String(text)]),
            LlmCall::SelectModelFileAndLoad
            | LlmCall::StopActivePrompt
            | LlmCall::ResetChatHistory => Ok(Vec::new()),
        }
    }

    fn from_call(method: &str, args: Vec<Value>) -> Result<Self, ProtocolError> {
        let mut args = Args::new(method, args);
        match method {
            "selectModelFileAndLoad" => Ok(LlmCall::SelectModelFileAndLoad),
            "loadSelectedModel" => Ok(LlmCall::LoadSelectedModel(args.next()?)),
            "prompt" => Ok(LlmCall::Prompt(args.next()?)),
            "stopActivePrompt" => Ok(LlmCall::StopActivePrompt),
            "resetChatHistory" => Ok(LlmCall::ResetChatHistory),
            "setDraftPrompt" => Ok(LlmCall::SetDraftPrompt(args.next()?)),
            other => Err(ProtocolError::UnknownMethod(other.to_string())),
        }
    }
}

/// Operations served by the renderer on the model control channel.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmRendererCall {
    UpdateState(LlmState),
}

impl Procedure for LlmRendererCall {
    fn method(&self) -> &'static str {
        match self {
            LlmRendererCall::UpdateState(_) => "updateState",
        }
    }

    fn into_args(self) -> Result<Vec<Value>, ProtocolError> {
        match self {
            LlmRendererCall::UpdateState(state) => Ok(vec![arg(&state)?]),
        }
    }

    fn from_call(method: &str, args: Vec<Value>) -> Result<Self, ProtocolError> {
        let mut args = Args::new(method, args);
        match method {
            "updateState" => Ok(LlmRendererCall::UpdateState(args.next()?)),
            other => Err(ProtocolError::UnknownMethod(other.to_string())),
        }
    }
}
