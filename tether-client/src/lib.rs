//! # tether-client
//!
//! Renderer side of tether.
//!
//! This crate provides:
//! - A typed [`Client`] for the file dialog, model control, database and settings endpoints
//! - [`SettingsSync`], keeping a renderer's theme and language in step with the host
//! - [`HostProcess`], running a host as a child process linked over its stdio

pub mod client;
pub mod connection;
pub mod error;
pub mod settings;

pub use client::Client;
pub use connection::{ClientConfig, HostProcess, DEFAULT_SHUTDOWN_TIMEOUT};
pub use error::ClientError;
pub use settings::{Direction, LocaleSink, NoLocale, SettingsState, SettingsSync, RTL_LANGUAGES};
