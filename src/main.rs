//! tether - privileged host of the tether bridge
//!
//! Serves the file dialog, model control, settings and database endpoints to a
//! sandboxed UI process over a framed link on stdin/stdout.

use std::sync::Arc;
use tether_host::{Host, HostConfig};
use tether_rpc::{PeerId, StreamLink};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging. stdout carries the link.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if TETHER_CONFIG is set, then env overrides)
    let config_path = std::env::var("TETHER_CONFIG").ok();
    let config = match HostConfig::load() {
        Ok(c) => {
            if let Some(path) = &config_path {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if config_path.is_some() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            // Otherwise fall back to defaults
            tracing::info!("Using default configuration");
            HostConfig::from_env()
        }
    };

    tracing::info!("Starting tether host");
    tracing::info!("  Data directory: {}", config.storage.data_dir.display());
    tracing::info!("  Storage engine: {}", config.storage.engine);
    tracing::info!("  Settings file: {}", config.settings_path().display());
    tracing::info!("  Call timeout: {:?}", config.rpc.call_timeout());

    let host = Host::from_config(&config).map_err(|e| {
        tracing::error!("Failed to start host: {}", e);
        e
    })?;

    // The UI process on the other end of stdio is window 1
    let window = PeerId(1);
    let link = Arc::new(StreamLink::stdio(window));
    let session = host.attach_window(link.clone(), window)?;

    tokio::select! {
        _ = link.closed() => {
            tracing::info!("Link to {} closed", session.window());
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down...");
            link.close();
        }
    }

    drop(session);
    tracing::info!("Host stopped");
    Ok(())
}
