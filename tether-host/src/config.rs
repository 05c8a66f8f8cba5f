//! Host configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via TETHER_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tether_protocol::endpoint::settings::{Settings, Theme};
use tether_store::EngineKind;

/// Host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Local store configuration.
    pub storage: StorageConfig,
    /// Initial UI settings.
    pub settings: SettingsConfig,
    /// RPC configuration.
    pub rpc: RpcSettings,
    /// File dialog configuration.
    pub dialog: DialogConfig,
}

impl HostConfig {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("TETHER_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: HostConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from a variable lookup.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        self.storage.apply_overrides(&var);
        self.settings.apply_overrides(&var);
        self.rpc.apply_overrides(&var);
        self.dialog.apply_overrides(&var);
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Path of the persisted settings file.
    pub fn settings_path(&self) -> PathBuf {
        self.settings
            .file
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join("settings.yaml"))
    }
}

/// Local store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Storage engine.
    pub engine: EngineKind,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            engine: EngineKind::File,
        }
    }
}

impl StorageConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var("TETHER_DATA") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(engine) = var("TETHER_STORAGE_ENGINE") {
            match engine.parse() {
                Ok(kind) => self.engine = kind,
                Err(e) => tracing::warn!("ignoring TETHER_STORAGE_ENGINE: {}", e),
            }
        }
    }
}

/// Settings used until the user changes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Settings file. Defaults to `settings.yaml` in the data directory.
    #[serde(default)]
    pub file: Option<PathBuf>,
    pub theme: Theme,
    pub language: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        let defaults = Settings::default();
        Self {
            file: None,
            theme: defaults.theme,
            language: defaults.language,
        }
    }
}

impl SettingsConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(theme) = var("TETHER_THEME") {
            match theme.parse() {
                Ok(theme) => self.theme = theme,
                Err(e) => tracing::warn!("ignoring TETHER_THEME: {}", e),
            }
        }

        if let Some(language) = var("TETHER_LANGUAGE") {
            if !language.is_empty() {
                self.language = language;
            }
        }
    }

    /// Settings snapshot for a fresh settings file.
    pub fn initial(&self) -> Settings {
        Settings {
            theme: self.theme,
            language: self.language.clone(),
        }
    }
}

/// RPC configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    /// Time the host waits for a renderer reply, in milliseconds.
    pub call_timeout_ms: u64,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            call_timeout_ms: tether_rpc::HOST_CALL_TIMEOUT.as_millis() as u64,
        }
    }
}

impl RpcSettings {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(timeout) = var("TETHER_CALL_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(0) => tracing::warn!("ignoring TETHER_CALL_TIMEOUT_MS: must be above zero"),
                Ok(ms) => self.call_timeout_ms = ms,
                Err(e) => tracing::warn!("ignoring TETHER_CALL_TIMEOUT_MS: {}", e),
            }
        }
    }

    /// Returns the call timeout as Duration.
    ///
    /// A zero timeout from a config file falls back to the default.
    pub fn call_timeout(&self) -> Duration {
        if self.call_timeout_ms == 0 {
            return tether_rpc::HOST_CALL_TIMEOUT;
        }
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// File dialog configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogConfig {
    /// Directory the open dialog starts in, when it exists.
    #[serde(default)]
    pub models_dir: Option<PathBuf>,
    /// Paths the headless dialog answers with. Empty means every dialog is
    /// cancelled.
    #[serde(default)]
    pub selection: Vec<String>,
}

impl DialogConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var("TETHER_MODELS_DIR") {
            self.models_dir = Some(PathBuf::from(dir));
        }

        if let Some(selection) = var("TETHER_DIALOG_SELECTION") {
            self.selection = std::env::split_paths(&selection)
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to access config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
