//! tether-cli - Command-line interface for a tether host
//!
//! Starts the host as a child process and drives its endpoints, either one
//! command at a time or from a REPL.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tether_client::{Client, ClientConfig, Direction, HostProcess, LocaleSink, SettingsSync};
use tether_protocol::endpoint::settings::Theme;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tether-cli")]
#[command(about = "Command-line interface for the tether host")]
#[command(version)]
struct Cli {
    /// Host binary to start
    #[arg(long, env = "TETHER_HOST_BIN", default_value = "tether")]
    host: String,

    /// Extra argument passed to the host (repeatable)
    #[arg(long = "host-arg", allow_hyphen_values = true)]
    host_args: Vec<String>,

    /// Call timeout in seconds
    #[arg(short, long, env = "TETHER_CLI_TIMEOUT", default_value = "60")]
    timeout: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start interactive REPL
    Repl,

    /// Show the host's settings
    Settings,

    /// Follow settings changes until Ctrl+C
    WatchSettings,

    /// Open the host's file dialog
    OpenDialog {
        /// Dialog title
        #[arg(long)]
        title: Option<String>,

        /// Only offer files with these extensions
        #[arg(short, long, value_delimiter = ',')]
        extensions: Vec<String>,

        /// Allow picking several files
        #[arg(short, long)]
        multiple: bool,
    },

    /// Pick a model file in the dialog and load it
    SelectModel,

    /// Load a model file
    LoadModel {
        /// Path to the model file
        path: String,
    },

    /// Load a model and send it a prompt
    Prompt {
        /// Path to the model file
        #[arg(short, long)]
        model: String,

        /// Prompt text
        text: String,
    },

    /// List stored models
    Models,

    /// Add a model record
    AddModel {
        /// Display name
        name: String,

        /// Description
        #[arg(short, long)]
        description: Option<String>,

        /// Model file URI
        #[arg(long)]
        model_uri: Option<String>,

        /// Config JSON (or @file.json to read from file)
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Update a model record
    UpdateModel {
        /// Model ID
        id: String,

        /// New display name
        #[arg(short, long)]
        name: Option<String>,

        /// New description
        #[arg(short, long)]
        description: Option<String>,

        /// New model file URI
        #[arg(long)]
        model_uri: Option<String>,
    },

    /// Delete a model record
    DeleteModel {
        /// Model ID
        id: String,
    },

    /// Read a stored prompt value
    GetPrompts {
        /// Prompt key
        key: String,
    },

    /// Store a prompt value
    SetPrompts {
        /// Prompt key
        key: String,

        /// Value JSON (or @file.json to read from file)
        value: String,
    },

    /// Record a chat exchange
    AddChat {
        /// Model ID
        #[arg(short, long)]
        model: String,

        /// User message
        message: String,

        /// Model response
        #[arg(short, long)]
        response: Option<String>,
    },

    /// Show the chat history of a model
    History {
        /// Model ID
        model: String,
    },
}

/// Prints every locale change.
struct PrintLocale;

impl LocaleSink for PrintLocale {
    fn language_changed(&self, language: &str, direction: Direction) {
        println!("{} {} ({})", "language".cyan(), language.yellow(), direction);
    }

    fn theme_changed(&self, theme: Theme) {
        println!("{} {}", "theme".cyan(), theme.to_string().yellow());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let process = HostProcess::spawn(&cli.host, &cli.host_args).map_err(|e| {
        eprintln!("{} {}: {}", "Failed to start".red(), cli.host, e);
        e
    })?;
    tracing::debug!("host {} running as pid {:?}", cli.host, process.id());
    let config = ClientConfig::new().with_call_timeout(Duration::from_secs(cli.timeout));
    let client = Client::with_config(process.link(), config.clone())?;

    let mut failed = false;
    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(&client, &cli.host).await?;
        }
        Some(Commands::WatchSettings) => {
            // Streams changes until interrupted
            match SettingsSync::start(&client, Arc::new(PrintLocale)).await {
                Ok(_sync) => {
                    eprintln!("{}", "Press Ctrl+C to stop...".dimmed());
                    let link = process.link();
                    tokio::select! {
                        _ = link.closed() => eprintln!("{}", "Host closed the link".red()),
                        _ = tokio::signal::ctrl_c() => eprintln!("\n{}", "Stopping watch...".dimmed()),
                    }
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    failed = true;
                }
            }
        }
        Some(cmd) => match commands::execute(&client, cmd).await {
            Ok(output) => println!("{}", output),
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                failed = true;
            }
        },
    }

    drop(client);
    process.shutdown(config.shutdown_timeout).await?;
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
