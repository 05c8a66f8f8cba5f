//! Host wiring: shared services plus one session per attached window.

use crate::config::HostConfig;
use crate::database::DatabaseService;
use crate::dialog::{FileDialogService, NativeDialog, PresetDialog};
use crate::error::HostError;
use crate::llm::{spawn_state_push, EchoEngine, InferenceEngine, LlmCore, LlmService};
use crate::settings::{spawn_settings_push, SettingsHub, SettingsService};
use std::sync::Arc;
use tether_protocol::endpoint::{database, file_dialog, llm, settings};
use tether_protocol::NoProcedures;
use tether_rpc::{EndpointRegistry, PeerId, RpcConfig, RpcCore, Transport};
use tether_store::Store;
use tokio::task::JoinHandle;

/// The privileged side of the bridge.
///
/// Services are shared; each attached window gets its own cores bound to it.
pub struct Host {
    settings: Arc<SettingsHub>,
    dialog: FileDialogService,
    llm: LlmService,
    database: DatabaseService,
    rpc: RpcConfig,
    registry: EndpointRegistry,
}

impl Host {
    pub fn new(
        settings: Arc<SettingsHub>,
        dialog: FileDialogService,
        llm: LlmService,
        database: DatabaseService,
        rpc: RpcConfig,
    ) -> Self {
        Self {
            settings,
            dialog,
            llm,
            database,
            rpc,
            registry: EndpointRegistry::new(),
        }
    }

    /// Builds a host from configuration with the headless dialog and the echo engine.
    pub fn from_config(config: &HostConfig) -> Result<Self, HostError> {
        let dialog: Arc<dyn NativeDialog> = Arc::new(PresetDialog::new(config.dialog.selection.clone()));
        Self::with_platform(config, dialog, Arc::new(EchoEngine::new()))
    }

    /// Builds a host from configuration with the given platform dialog and engine.
    pub fn with_platform(
        config: &HostConfig,
        dialog: Arc<dyn NativeDialog>,
        engine: Arc<dyn InferenceEngine>,
    ) -> Result<Self, HostError> {
        let store = Store::open(config.storage.engine, &config.storage.data_dir)?;
        let settings = SettingsHub::open(config.settings_path(), config.settings.initial())?;
        let dialog = FileDialogService::new(dialog, config.dialog.models_dir.clone());
        let llm = LlmService::new(engine, dialog.clone(), Some(env!("CARGO_PKG_VERSION").to_string()));
        let rpc = RpcConfig::host().with_call_timeout(config.rpc.call_timeout());

        Ok(Self::new(
            Arc::new(settings),
            dialog,
            llm,
            DatabaseService::new(store),
            rpc,
        ))
    }

    pub fn settings(&self) -> &Arc<SettingsHub> {
        &self.settings
    }

    pub fn llm(&self) -> &LlmService {
        &self.llm
    }

    pub fn database(&self) -> &DatabaseService {
        &self.database
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Serves every endpoint to `window` over `transport`.
    ///
    /// Fails if the window is already attached. Dropping the session detaches it.
    pub fn attach_window(&self, transport: Arc<dyn Transport>, window: PeerId) -> Result<WindowSession, HostError> {
        let channel = |pair| self.registry.channel(transport.clone(), pair, Some(window));

        let file_dialog = RpcCore::spawn(channel(file_dialog::HOST)?, self.dialog.clone(), self.rpc.clone())?;
        let settings = RpcCore::spawn(
            channel(settings::HOST)?,
            SettingsService::new(self.settings.clone()),
            self.rpc.clone(),
        )?;
        let database = RpcCore::spawn(channel(database::HOST)?, self.database.clone(), self.rpc.clone())?;
        let llm = Arc::new(RpcCore::spawn(channel(llm::HOST)?, self.llm.clone(), self.rpc.clone())?);

        let tasks = vec![
            spawn_settings_push(&self.settings, transport.clone()),
            spawn_state_push(llm.clone(), self.llm.subscribe()),
        ];
        tracing::info!("Attached {}", window);

        Ok(WindowSession {
            window,
            _file_dialog: file_dialog,
            _settings: settings,
            _database: database,
            llm,
            tasks,
        })
    }
}

/// Endpoints served to one window.
pub struct WindowSession {
    window: PeerId,
    _file_dialog: RpcCore<FileDialogService, NoProcedures>,
    _settings: RpcCore<SettingsService, NoProcedures>,
    _database: RpcCore<DatabaseService, NoProcedures>,
    llm: Arc<LlmCore>,
    tasks: Vec<JoinHandle<()>>,
}

impl WindowSession {
    pub fn window(&self) -> PeerId {
        self.window
    }

    /// The window's model-control core, which also calls the renderer.
    pub fn llm(&self) -> &LlmCore {
        &self.llm
    }

    /// Returns whether the window's transport has gone away.
    pub fn is_closed(&self) -> bool {
        self.llm.is_closed()
    }
}

impl Drop for WindowSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        tracing::info!("Detached {}", self.window);
    }
}
