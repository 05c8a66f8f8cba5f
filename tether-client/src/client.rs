//! High-level client API.

use crate::connection::ClientConfig;
use crate::error::ClientError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tether_protocol::endpoint::database::{ChatMessage, DatabaseCall, Model, ModelFields, ModelPatch};
use tether_protocol::endpoint::file_dialog::{DialogSelection, FileDialogCall, OpenDialogOptions};
use tether_protocol::endpoint::llm::{LlmCall, LlmRendererCall, LlmState};
use tether_protocol::endpoint::settings::{Settings, SettingsCall};
use tether_protocol::endpoint::{database, file_dialog, llm, settings};
use tether_protocol::RemoteError;
use tether_rpc::{EndpointRegistry, NoService, RpcCore, Service, Transport};
use tokio::sync::watch;

/// Receives model-control state pushed by the host.
struct StateReceiver {
    state: watch::Sender<LlmState>,
}

#[async_trait]
impl Service for StateReceiver {
    type Call = LlmRendererCall;

    async fn handle(&self, call: LlmRendererCall) -> Result<Value, RemoteError> {
        match call {
            LlmRendererCall::UpdateState(state) => {
                tracing::trace!("model state updated (loaded={})", state.model.loaded);
                self.state.send_replace(state);
                Ok(Value::Null)
            }
        }
    }
}

/// Renderer-side client for every host endpoint on one transport.
pub struct Client {
    transport: Arc<dyn Transport>,
    file_dialog: RpcCore<NoService, FileDialogCall>,
    llm: RpcCore<StateReceiver, LlmCall>,
    database: RpcCore<NoService, DatabaseCall>,
    settings: RpcCore<NoService, SettingsCall>,
    llm_state: watch::Receiver<LlmState>,
}

impl Client {
    /// Creates a client with default configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self, ClientError> {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: ClientConfig) -> Result<Self, ClientError> {
        Self::with_registry(transport, &EndpointRegistry::new(), config)
    }

    /// Creates a client whose channels are claimed in `registry`.
    ///
    /// Fails if another client already holds one of the renderer channels.
    pub fn with_registry(
        transport: Arc<dyn Transport>,
        registry: &EndpointRegistry,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let rpc = config.rpc();
        let (state_tx, llm_state) = watch::channel(LlmState::default());

        let file_dialog = RpcCore::spawn(
            registry.channel(transport.clone(), file_dialog::RENDERER, None)?,
            NoService,
            rpc.clone(),
        )?;
        let llm = RpcCore::spawn(
            registry.channel(transport.clone(), llm::RENDERER, None)?,
            StateReceiver { state: state_tx },
            rpc.clone(),
        )?;
        let database = RpcCore::spawn(
            registry.channel(transport.clone(), database::RENDERER, None)?,
            NoService,
            rpc.clone(),
        )?;
        let settings = RpcCore::spawn(
            registry.channel(transport.clone(), settings::RENDERER, None)?,
            NoService,
            rpc,
        )?;

        Ok(Self {
            transport,
            file_dialog,
            llm,
            database,
            settings,
            llm_state,
        })
    }

    /// The transport under this client.
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Returns whether the host end has gone away.
    pub fn is_closed(&self) -> bool {
        self.llm.is_closed()
    }

    // =========================================================================
    // File dialog
    // =========================================================================

    /// Opens the host's file picker. `None` when the user cancelled.
    pub async fn show_open_dialog(
        &self,
        options: OpenDialogOptions,
    ) -> Result<Option<DialogSelection>, ClientError> {
        Ok(self
            .file_dialog
            .call_as(FileDialogCall::ShowOpenDialog(options))
            .await?)
    }

    // =========================================================================
    // Model control
    // =========================================================================

    /// Picks a model file and loads it. Returns the path, or `None` if cancelled.
    pub async fn select_model_file_and_load(&self) -> Result<Option<String>, ClientError> {
        Ok(self.llm.call_as(LlmCall::SelectModelFileAndLoad).await?)
    }

    pub async fn load_selected_model(&self, path: &str) -> Result<(), ClientError> {
        self.llm.call(LlmCall::LoadSelectedModel(path.to_string())).await?;
        Ok(())
    }

    /// Sends a prompt and waits for the full response.
    ///
    /// Partial output streams through [`Client::watch_llm_state`].
    pub async fn prompt(&self, text: &str) -> Result<String, ClientError> {
        Ok(self.llm.call_as(LlmCall::Prompt(text.to_string())).await?)
    }

    pub async fn stop_active_prompt(&self) -> Result<(), ClientError> {
        self.llm.call(LlmCall::StopActivePrompt).await?;
        Ok(())
    }

    pub async fn reset_chat_history(&self) -> Result<(), ClientError> {
        self.llm.call(LlmCall::ResetChatHistory).await?;
        Ok(())
    }

    pub async fn set_draft_prompt(&self, text: &str) -> Result<(), ClientError> {
        self.llm.call(LlmCall::SetDraftPrompt(text.to_string())).await?;
        Ok(())
    }

    /// Latest model state pushed by the host.
    pub fn llm_state(&self) -> LlmState {
        self.llm_state.borrow().clone()
    }

    /// Observes model state pushes.
    pub fn watch_llm_state(&self) -> watch::Receiver<LlmState> {
        self.llm_state.clone()
    }

    // =========================================================================
    // Database
    // =========================================================================

    pub async fn get_models(&self) -> Result<Vec<Model>, ClientError> {
        Ok(self.database.call_as(DatabaseCall::GetModels).await?)
    }

    /// Adds a model and returns its new id.
    pub async fn add_model(&self, fields: ModelFields) -> Result<String, ClientError> {
        Ok(self.database.call_as(DatabaseCall::AddModel(fields)).await?)
    }

    pub async fn update_model(&self, id: &str, patch: ModelPatch) -> Result<(), ClientError> {
        self.database
            .call(DatabaseCall::UpdateModel {
                id: id.to_string(),
                patch,
            })
            .await?;
        Ok(())
    }

    pub async fn delete_model(&self, id: &str) -> Result<(), ClientError> {
        self.database.call(DatabaseCall::DeleteModel(id.to_string())).await?;
        Ok(())
    }

    /// Reads a stored prompt value. `None` when the key was never set.
    pub async fn get_prompts(&self, key: &str) -> Result<Option<Value>, ClientError> {
        let value = self.database.call(DatabaseCall::GetPrompts(key.to_string())).await?;
        Ok((!value.is_null()).then_some(value))
    }

    pub async fn set_prompts(&self, key: &str, value: Value) -> Result<(), ClientError> {
        self.database
            .call(DatabaseCall::SetPrompts {
                key: key.to_string(),
                value,
            })
            .await?;
        Ok(())
    }

    /// Appends a chat exchange and returns its id.
    pub async fn add_chat_message(
        &self,
        model_id: &str,
        message: &str,
        response: Option<&str>,
    ) -> Result<String, ClientError> {
        Ok(self
            .database
            .call_as(DatabaseCall::AddChatMessage {
                model_id: model_id.to_string(),
                message: message.to_string(),
                response: response.map(str::to_string),
            })
            .await?)
    }

    pub async fn get_chat_history(&self, model_id: &str) -> Result<Vec<ChatMessage>, ClientError> {
        Ok(self
            .database
            .call_as(DatabaseCall::GetChatHistory(model_id.to_string()))
            .await?)
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Pulls the host's current settings.
    pub async fn get_settings(&self) -> Result<Settings, ClientError> {
        Ok(self.settings.call_as(SettingsCall::Get).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use tether_host::{
        DatabaseService, EchoEngine, FileDialogService, Host, LlmService, PresetDialog, SettingsHub,
        WindowSession,
    };
    use tether_protocol::endpoint::settings::Theme;
    use tether_protocol::ErrorCode;
    use crate::settings::{NoLocale, SettingsSync};
    use tether_rpc::{MemoryHub, PeerId, RpcConfig, StreamLink, WindowPort};
    use tether_store::Store;

    const WAIT: Duration = Duration::from_secs(5);

    fn host(selection: Vec<String>) -> Host {
        let dialog = FileDialogService::new(Arc::new(PresetDialog::new(selection)), None);
        let llm = LlmService::new(Arc::new(EchoEngine::new()), dialog.clone(), None);
        Host::new(
            Arc::new(SettingsHub::new(Settings::default())),
            dialog,
            llm,
            DatabaseService::new(Store::in_memory()),
            RpcConfig::host(),
        )
    }

    /// Client first, so the host's first state push has a listener.
    fn connect(host: &Host, hub: &MemoryHub) -> (Client, WindowPort, WindowSession) {
        let window = hub.open_window();
        let client = Client::new(Arc::new(window.clone())).unwrap();
        let session = host
            .attach_window(Arc::new(hub.host_port(window.id())), window.id())
            .unwrap();
        (client, window, session)
    }

    /// Host and client on the two ends of a framed byte stream, as when the
    /// host runs as a child process.
    fn connect_over_link(host: &Host) -> (Client, Arc<StreamLink>, WindowSession) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let (host_read, host_write) = tokio::io::split(a);
        let (ui_read, ui_write) = tokio::io::split(b);
        let window = PeerId(1);

        let ui_link = Arc::new(StreamLink::new(ui_read, ui_write, PeerId::HOST));
        let client = Client::new(ui_link).unwrap();
        let host_link = Arc::new(StreamLink::new(host_read, host_write, window));
        let session = host.attach_window(host_link.clone(), window).unwrap();
        (client, host_link, session)
    }

    #[tokio::test]
    async fn test_host_and_client_over_stream_link() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("tiny.gguf");
        std::fs::write(&model, b"GGUF").unwrap();
        let model = model.to_string_lossy().into_owned();

        let host = host(vec![]);
        let (client, link, _session) = connect_over_link(&host);

        assert_eq!(client.get_settings().await.unwrap(), Settings::default());

        // settings-updated crosses the link
        let sync = SettingsSync::start(&client, Arc::new(NoLocale)).await.unwrap();
        let mut changes = sync.subscribe();
        host.settings().set_theme(Theme::Dark).unwrap();
        tokio::time::timeout(
            WAIT,
            changes.wait_for(|s| s.as_ref().map(|s| s.theme) == Some(Theme::Dark)),
        )
        .await
        .unwrap()
        .unwrap();

        let err = client
            .update_model("missing", ModelPatch::name("x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.code(), Some(ErrorCode::NotFound));

        // updateState calls from the host cross the link
        client.load_selected_model(&model).await.unwrap();
        let mut states = client.watch_llm_state();
        tokio::time::timeout(WAIT, states.wait_for(|s| s.model.loaded))
            .await
            .unwrap()
            .unwrap();

        assert!(!link.is_closed());
    }

    #[tokio::test]
    async fn test_database_round_trip() {
        let hub = MemoryHub::new();
        let host = host(vec![]);
        let (client, _window, _session) = connect(&host, &hub);

        let id = client.add_model(ModelFields::named("Llama")).await.unwrap();
        client.update_model(&id, ModelPatch::name("Mistral")).await.unwrap();

        let models = client.get_models().await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, id);
        assert_eq!(models[0].name, "Mistral");
        assert!(models[0].updated_at.is_some());

        client.delete_model(&id).await.unwrap();
        assert!(client.get_models().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_model_is_not_found() {
        let hub = MemoryHub::new();
        let host = host(vec![]);
        let (client, _window, _session) = connect(&host, &hub);

        let err = client
            .update_model("missing", ModelPatch::name("x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(
            err,
            ClientError::HostError { ref message, .. } if message == "Model with id missing not found"
        ));
    }

    #[tokio::test]
    async fn test_prompts_and_history() {
        let hub = MemoryHub::new();
        let host = host(vec![]);
        let (client, _window, _session) = connect(&host, &hub);

        assert_eq!(client.get_prompts("system").await.unwrap(), None);
        client.set_prompts("system", json!(["be brief"])).await.unwrap();
        assert_eq!(client.get_prompts("system").await.unwrap(), Some(json!(["be brief"])));

        client.add_chat_message("m-1", "hi", Some("hello")).await.unwrap();
        client.add_chat_message("m-2", "other", None).await.unwrap();
        let history = client.get_chat_history("m-1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "hi");
        assert_eq!(history[0].response.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_cancelled_dialog_is_none() {
        let hub = MemoryHub::new();
        let host = host(vec![]);
        let (client, _window, _session) = connect(&host, &hub);

        let picked = client
            .show_open_dialog(OpenDialogOptions::titled("Pick"))
            .await
            .unwrap();
        assert_eq!(picked, None);
        assert_eq!(client.select_model_file_and_load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_and_prompt() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("tiny.gguf");
        std::fs::write(&model, b"GGUF").unwrap();
        let model = model.to_string_lossy().into_owned();

        let hub = MemoryHub::new();
        let host = host(vec![model.clone()]);
        let (client, _window, _session) = connect(&host, &hub);

        let picked = client.select_model_file_and_load().await.unwrap();
        assert_eq!(picked.as_deref(), Some(model.as_str()));

        let mut states = client.watch_llm_state();
        tokio::time::timeout(WAIT, states.wait_for(|s| s.model.loaded))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            client.llm_state().selected_model_file_path.as_deref(),
            Some(model.as_str())
        );

        let response = client.prompt("hi").await.unwrap();
        assert_eq!(response, "You said: hi");

        tokio::time::timeout(
            WAIT,
            states.wait_for(|s| !s.chat_session.generating_result && !s.chat_session.simplified_chat.is_empty()),
        )
        .await
        .unwrap()
        .unwrap();

        client.reset_chat_history().await.unwrap();
        client.stop_active_prompt().await.unwrap();
    }

    #[tokio::test]
    async fn test_prompt_without_model_is_unavailable() {
        let hub = MemoryHub::new();
        let host = host(vec![]);
        let (client, _window, _session) = connect(&host, &hub);

        let err = client.prompt("hi").await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Unavailable));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_get_settings() {
        let hub = MemoryHub::new();
        let host = host(vec![]);
        host.settings().set_theme(Theme::Light).unwrap();
        let (client, _window, _session) = connect(&host, &hub);

        let settings = client.get_settings().await.unwrap();
        assert_eq!(settings.theme, Theme::Light);
        assert_eq!(settings.language, "en");
    }

    #[tokio::test]
    async fn test_second_client_on_registry_rejected() {
        let hub = MemoryHub::new();
        let window: Arc<dyn Transport> = Arc::new(hub.open_window());
        let registry = EndpointRegistry::new();

        let first = Client::with_registry(window.clone(), &registry, ClientConfig::default()).unwrap();
        assert!(matches!(
            Client::with_registry(window.clone(), &registry, ClientConfig::default()),
            Err(ClientError::Registry(_))
        ));

        drop(first);
        assert!(Client::with_registry(window, &registry, ClientConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_call_times_out_without_host() {
        let hub = MemoryHub::new();
        let window = hub.open_window();
        let config = ClientConfig::new().with_call_timeout(Duration::from_millis(50));
        let client = Client::with_config(Arc::new(window), config).unwrap();

        let err = tokio_test::assert_err!(client.get_models().await);
        assert!(matches!(err, ClientError::Timeout { ref method, .. } if method == "getModels"));
        assert!(err.is_retryable());
    }
}
