//! Model-control endpoint.
//!
//! [`LlmService`] drives an [`InferenceEngine`] and keeps the [`LlmState`]
//! every window renders. Each change is pushed to the renderer by calling its
//! `updateState` function.

use crate::dialog::FileDialogService;
use crate::error::{remote, HostError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tether_protocol::endpoint::file_dialog::{FileFilter, OpenDialogOptions};
use tether_protocol::endpoint::llm::{
    ChatItem, ChatItemKind, ChatSession, DraftPrompt, LlmCall, LlmRendererCall, LlmState, ModelStatus,
};
use tether_protocol::RemoteError;
use tether_rpc::{reply, RpcCore, RpcError, Service};
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};

/// Model file extension offered by the model picker.
pub const MODEL_EXTENSION: &str = "gguf";

/// A local inference engine.
#[async_trait]
pub trait InferenceEngine: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Loads the model at `path`, reporting progress between 0 and 1.
    async fn load(&self, path: &Path, progress: &(dyn Fn(f32) + Send + Sync)) -> Result<(), HostError>;

    /// Answers `text`, sending the response in chunks as it is produced.
    async fn prompt(&self, text: &str, chunks: mpsc::UnboundedSender<String>) -> Result<(), HostError>;

    /// Forgets the conversation.
    async fn reset(&self) -> Result<(), HostError>;

    /// Suggests a continuation for a prompt being typed.
    fn complete(&self, _draft: &str) -> String {
        String::new()
    }
}

/// Engine that echoes prompts back. For development and headless runs.
pub struct EchoEngine {
    chunk_delay: Duration,
    loaded: Mutex<Option<PathBuf>>,
    history: Mutex<Vec<String>>,
}

impl EchoEngine {
    pub fn new() -> Self {
        Self::with_chunk_delay(Duration::ZERO)
    }

    /// Waits `delay` before each response chunk.
    pub fn with_chunk_delay(delay: Duration) -> Self {
        Self {
            chunk_delay: delay,
            loaded: Mutex::new(None),
            history: Mutex::new(Vec::new()),
        }
    }
}

impl Default for EchoEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceEngine for EchoEngine {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn load(&self, path: &Path, progress: &(dyn Fn(f32) + Send + Sync)) -> Result<(), HostError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| HostError::Inference(format!("cannot open {}: {}", path.display(), e)))?;
        if !meta.is_file() {
            return Err(HostError::Inference(format!("{} is not a file", path.display())));
        }
        progress(0.5);
        *self.loaded.lock() = Some(path.to_path_buf());
        progress(1.0);
        Ok(())
    }

    async fn prompt(&self, text: &str, chunks: mpsc::UnboundedSender<String>) -> Result<(), HostError> {
        if self.loaded.lock().is_none() {
            return Err(HostError::ModelNotLoaded);
        }
        self.history.lock().push(text.to_string());

        let response = format!("You said: {}", text);
        for (i, word) in response.split(' ').enumerate() {
            if !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            let chunk = if i == 0 { word.to_string() } else { format!(" {}", word) };
            if chunks.send(chunk).is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn reset(&self) -> Result<(), HostError> {
        self.history.lock().clear();
        Ok(())
    }

    fn complete(&self, draft: &str) -> String {
        if draft.is_empty() {
            return String::new();
        }
        self.history
            .lock()
            .iter()
            .rev()
            .find(|past| past.len() > draft.len() && past.starts_with(draft))
            .map(|past| past[draft.len()..].to_string())
            .unwrap_or_default()
    }
}

struct LlmInner {
    engine: Arc<dyn InferenceEngine>,
    dialog: FileDialogService,
    state: watch::Sender<LlmState>,
    active_prompt: Mutex<Option<AbortHandle>>,
    loading: tokio::sync::Mutex<()>,
}

/// Serves the host side of `llmRpc`. Shared by every window.
#[derive(Clone)]
pub struct LlmService {
    inner: Arc<LlmInner>,
}

impl LlmService {
    pub fn new(engine: Arc<dyn InferenceEngine>, dialog: FileDialogService, app_version: Option<String>) -> Self {
        let (state, _) = watch::channel(LlmState {
            app_version,
            ..Default::default()
        });
        tracing::debug!("model control using {} engine", engine.name());
        Self {
            inner: Arc::new(LlmInner {
                engine,
                dialog,
                state,
                active_prompt: Mutex::new(None),
                loading: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> LlmState {
        self.inner.state.borrow().clone()
    }

    /// Observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<LlmState> {
        self.inner.state.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut LlmState)) {
        self.inner.state.send_modify(f);
    }

    /// Asks for a model file and loads it. `None` when the dialog was cancelled.
    pub async fn select_model_file_and_load(&self) -> Result<Option<String>, HostError> {
        let options = OpenDialogOptions {
            button_label: Some("Load".into()),
            ..OpenDialogOptions::titled("Select a model file")
        }
        .with_filter(FileFilter::new("GGUF models", &[MODEL_EXTENSION]));

        let picked = self.inner.dialog.open(options).await?;
        let Some(path) = picked.as_ref().and_then(|s| s.first()).map(str::to_string) else {
            tracing::debug!("model selection cancelled");
            return Ok(None);
        };
        self.load_model(&path).await?;
        Ok(Some(path))
    }

    /// Loads a model, replacing the current one and its chat session.
    ///
    /// A failure is also recorded on the state's model status.
    pub async fn load_model(&self, path: &str) -> Result<(), HostError> {
        let _loading = self.inner.loading.lock().await;
        self.stop_active_prompt();

        let name = Path::new(path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
        self.update(|state| {
            state.selected_model_file_path = Some(path.to_string());
            state.model = ModelStatus {
                name,
                ..Default::default()
            };
            state.chat_session = ChatSession::default();
        });

        let progress = |fraction: f32| {
            self.inner
                .state
                .send_modify(|state| state.model.load_progress = fraction.clamp(0.0, 1.0));
        };
        match self.inner.engine.load(Path::new(path), &progress).await {
            Ok(()) => {
                tracing::info!("Loaded model {}", path);
                self.update(|state| {
                    state.model.loaded = true;
                    state.model.load_progress = 1.0;
                    state.chat_session.loaded = true;
                });
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to load model {}: {}", path, e);
                let message = e.to_string();
                self.update(|state| state.model.error = Some(message));
                Err(e)
            }
        }
    }

    /// Runs a prompt to completion or until stopped, returning the response.
    pub async fn prompt(&self, text: String) -> Result<String, HostError> {
        let ready = {
            let state = self.inner.state.borrow();
            state.model.loaded && state.chat_session.loaded
        };
        if !ready {
            return Err(HostError::ModelNotLoaded);
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = {
            let mut active = self.inner.active_prompt.lock();
            if active.is_some() {
                return Err(HostError::PromptInProgress);
            }
            let engine = self.inner.engine.clone();
            let input = text.clone();
            let task = tokio::spawn(async move { engine.prompt(&input, tx).await });
            *active = Some(task.abort_handle());
            task
        };

        self.update(|state| {
            let session = &mut state.chat_session;
            session.generating_result = true;
            session.draft_prompt = DraftPrompt::default();
            session.simplified_chat.push(ChatItem {
                kind: ChatItemKind::User,
                message: text,
            });
            session.simplified_chat.push(ChatItem {
                kind: ChatItemKind::Model,
                message: String::new(),
            });
        });

        let mut response = String::new();
        while let Some(chunk) = rx.recv().await {
            response.push_str(&chunk);
            self.update(|state| {
                if let Some(last) = state.chat_session.simplified_chat.last_mut() {
                    last.message.push_str(&chunk);
                }
            });
        }

        let outcome = task.await;
        self.inner.active_prompt.lock().take();
        self.update(|state| state.chat_session.generating_result = false);

        match outcome {
            Ok(Ok(())) => Ok(response),
            Ok(Err(e)) => Err(e),
            Err(e) if e.is_cancelled() => {
                tracing::debug!("prompt stopped after {} bytes", response.len());
                Ok(response)
            }
            Err(e) => Err(HostError::Inference(format!("prompt task failed: {}", e))),
        }
    }

    /// Stops the running prompt. Returns whether one was running.
    pub fn stop_active_prompt(&self) -> bool {
        match self.inner.active_prompt.lock().as_ref() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub async fn reset_chat_history(&self) -> Result<(), HostError> {
        self.stop_active_prompt();
        self.inner.engine.reset().await?;
        self.update(|state| {
            state.chat_session.simplified_chat.clear();
            state.chat_session.draft_prompt = DraftPrompt::default();
        });
        Ok(())
    }

    pub fn set_draft_prompt(&self, prompt: String) {
        let completion = self.inner.engine.complete(&prompt);
        self.update(|state| state.chat_session.draft_prompt = DraftPrompt { prompt, completion });
    }
}

#[async_trait]
impl Service for LlmService {
    type Call = LlmCall;

    async fn handle(&self, call: LlmCall) -> Result<Value, RemoteError> {
        match call {
            LlmCall::SelectModelFileAndLoad => {
                let path = self.select_model_file_and_load().await.map_err(remote)?;
                reply(&path)
            }
            LlmCall::LoadSelectedModel(path) => {
                self.load_model(&path).await.map_err(remote)?;
                Ok(Value::Null)
            }
            LlmCall::Prompt(text) => {
                let response = self.prompt(text).await.map_err(remote)?;
                reply(&response)
            }
            LlmCall::StopActivePrompt => {
                self.stop_active_prompt();
                Ok(Value::Null)
            }
            LlmCall::ResetChatHistory => {
                self.reset_chat_history().await.map_err(remote)?;
                Ok(Value::Null)
            }
            LlmCall::SetDraftPrompt(text) => {
                self.set_draft_prompt(text);
                Ok(Value::Null)
            }
        }
    }
}

/// Host end of `llmRpc` for one window.
pub type LlmCore = RpcCore<LlmService, LlmRendererCall>;

/// Calls the renderer's `updateState` with the latest state, now and after
/// every change. Changes made while a push is in flight collapse into one.
///
/// Ends when the window goes away.
pub fn spawn_state_push(core: Arc<LlmCore>, mut states: watch::Receiver<LlmState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let state = states.borrow_and_update().clone();
            match core.call(LlmRendererCall::UpdateState(state)).await {
                Ok(_) => {}
                Err(e @ (RpcError::Closed | RpcError::Transport(_))) => {
                    tracing::debug!("state push on {} stopped: {}", core.channel(), e);
                    break;
                }
                Err(e) => tracing::warn!("state push on {} failed: {}", core.channel(), e),
            }
            if states.changed().await.is_err() {
                break;
            }
        }
    })
}
