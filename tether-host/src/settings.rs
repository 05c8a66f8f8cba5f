//! Authoritative UI settings and their push to windows.

use crate::error::HostError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tether_protocol::endpoint::settings::{Settings, SettingsCall, SettingsPatch, Theme};
use tether_protocol::endpoint::SETTINGS_UPDATED;
use tether_protocol::{Codec, RemoteError};
use tether_rpc::{reply, Service, Transport};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Languages the UI ships translations for.
pub const SUPPORTED_LANGUAGES: [&str; 4] = ["en", "ar", "fr", "zh_CN"];

/// Language used when a request matches nothing supported.
pub const FALLBACK_LANGUAGE: &str = "en";

const UPDATE_CAPACITY: usize = 64;

/// Resolves a requested language or locale against [`SUPPORTED_LANGUAGES`].
///
/// `zh-CN` matches `zh_CN`, `fr-FR` falls back to `fr`, anything else to `en`.
pub fn resolve_language(requested: &str) -> &'static str {
    let normalized = requested.trim().replace('-', "_");
    let exact = SUPPORTED_LANGUAGES
        .iter()
        .find(|lang| lang.eq_ignore_ascii_case(&normalized))
        .copied();
    if let Some(lang) = exact {
        return lang;
    }

    let primary = normalized.split('_').next().unwrap_or_default();
    SUPPORTED_LANGUAGES
        .iter()
        .find(|lang| lang.eq_ignore_ascii_case(primary))
        .copied()
        .unwrap_or(FALLBACK_LANGUAGE)
}

/// Holds the authoritative settings and broadcasts every change.
pub struct SettingsHub {
    current: Mutex<Settings>,
    path: Option<PathBuf>,
    updates: broadcast::Sender<SettingsPatch>,
}

impl SettingsHub {
    /// Creates a hub that does not persist.
    pub fn new(initial: Settings) -> Self {
        Self::with_path(initial, None)
    }

    /// Opens the settings file at `path`, creating it from `defaults` if absent.
    pub fn open(path: impl AsRef<Path>, defaults: Settings) -> Result<Self, HostError> {
        let path = path.as_ref();
        let settings = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let settings: Settings = serde_yaml::from_str(&content)
                .map_err(|e| HostError::Settings(format!("{}: {}", path.display(), e)))?;
            tracing::info!("Loaded settings from {}", path.display());
            settings
        } else {
            defaults
        };

        let hub = Self::with_path(settings, Some(path.to_path_buf()));
        hub.persist(&hub.current.lock())?;
        Ok(hub)
    }

    fn with_path(mut initial: Settings, path: Option<PathBuf>) -> Self {
        initial.language = resolve_language(&initial.language).to_string();
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            current: Mutex::new(initial),
            path,
            updates,
        }
    }

    /// Current snapshot.
    pub fn get(&self) -> Settings {
        self.current.lock().clone()
    }

    pub fn set_theme(&self, theme: Theme) -> Result<bool, HostError> {
        self.apply(SettingsPatch::theme(theme))
    }

    /// Sets the language after resolving it. Setting the current language is a no-op.
    pub fn set_language(&self, language: &str) -> Result<bool, HostError> {
        self.apply(SettingsPatch::language(resolve_language(language)))
    }

    /// Applies a patch, persists it and broadcasts the fields that changed.
    ///
    /// Returns `false` without broadcasting when nothing changed.
    pub fn apply(&self, mut patch: SettingsPatch) -> Result<bool, HostError> {
        if let Some(language) = patch.language.as_mut() {
            *language = resolve_language(language).to_string();
        }

        let mut current = self.current.lock();
        if patch.theme == Some(current.theme) {
            patch.theme = None;
        }
        if patch.language.as_deref() == Some(current.language.as_str()) {
            patch.language = None;
        }
        if patch.is_empty() {
            return Ok(false);
        }

        let mut next = current.clone();
        next.apply(&patch);
        self.persist(&next)?;
        *current = next;

        tracing::info!("Settings changed: {:?}", patch);
        // No window attached is fine.
        let _ = self.updates.send(patch);
        Ok(true)
    }

    /// Receives every change patch from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SettingsPatch> {
        self.updates.subscribe()
    }

    fn persist(&self, settings: &Settings) -> Result<(), HostError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            serde_yaml::to_string(settings).map_err(|e| HostError::Settings(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Serves `settings-get`.
pub struct SettingsService {
    hub: Arc<SettingsHub>,
}

impl SettingsService {
    pub fn new(hub: Arc<SettingsHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Service for SettingsService {
    type Call = SettingsCall;

    async fn handle(&self, call: SettingsCall) -> Result<Value, RemoteError> {
        match call {
            SettingsCall::Get => reply(&self.hub.get()),
        }
    }
}

/// Posts every settings patch to one window on `settings-updated`.
///
/// Ends when the window's transport closes.
pub fn spawn_settings_push(hub: &SettingsHub, transport: Arc<dyn Transport>) -> JoinHandle<()> {
    let mut updates = hub.subscribe();
    tokio::spawn(async move {
        loop {
            let patch = match updates.recv().await {
                Ok(patch) => patch,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("settings push lagged, {} patches skipped", missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let payload = match Codec::encode_push(&patch) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!("failed to encode settings patch: {}", e);
                    continue;
                }
            };
            if let Err(e) = transport.send(SETTINGS_UPDATED, payload) {
                tracing::debug!("settings push stopped: {}", e);
                break;
            }
        }
    })
}
