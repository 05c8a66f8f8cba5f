//! # tether-host
//!
//! Host role for tether.
//!
//! This crate provides:
//! - The authoritative settings hub and its `settings-updated` push
//! - File dialog, model-control and database services
//! - Per-window wiring of every endpoint through an endpoint registry
//! - YAML and environment configuration

pub mod config;
pub mod database;
pub mod dialog;
pub mod error;
pub mod host;
pub mod llm;
pub mod settings;

pub use config::{ConfigError, DialogConfig, HostConfig, RpcSettings, SettingsConfig, StorageConfig};
pub use database::DatabaseService;
pub use dialog::{DialogRequest, FileDialogService, NativeDialog, PresetDialog};
pub use error::HostError;
pub use host::{Host, WindowSession};
pub use llm::{spawn_state_push, EchoEngine, InferenceEngine, LlmCore, LlmService};
pub use settings::{resolve_language, spawn_settings_push, SettingsHub, SettingsService};
