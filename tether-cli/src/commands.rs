//! Command execution.

use crate::Commands;
use colored::Colorize;
use serde_json::Value;
use std::io::Write;
use tether_client::Client;
use tether_protocol::endpoint::database::{ChatMessage, Model, ModelFields, ModelPatch};
use tether_protocol::endpoint::file_dialog::{DialogSelection, FileFilter, OpenDialogOptions};
use tether_protocol::endpoint::llm::{ChatItemKind, LlmState};

/// Executes a command and returns the formatted output.
pub async fn execute(client: &Client, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        // Handled in main.rs
        Commands::Repl | Commands::WatchSettings => unreachable!(),

        Commands::Settings => {
            let settings = client.get_settings().await?;
            Ok(format!(
                "{}\n  Theme: {}\n  Language: {}",
                "Settings".bold(),
                settings.theme.to_string().yellow(),
                settings.language.yellow()
            ))
        }

        Commands::OpenDialog {
            title,
            extensions,
            multiple,
        } => {
            let mut options = OpenDialogOptions {
                title,
                ..Default::default()
            };
            if !extensions.is_empty() {
                let exts: Vec<&str> = extensions.iter().map(String::as_str).collect();
                options = options.with_filter(FileFilter::new("Files", &exts));
            }
            if multiple {
                options = options.allow_multiple();
            }
            let selection = client.show_open_dialog(options).await?;
            Ok(format_selection(selection))
        }

        Commands::SelectModel => match client.select_model_file_and_load().await? {
            Some(path) => Ok(format!("{} {}", "Loaded".green(), path.cyan())),
            None => Ok("Cancelled".yellow().to_string()),
        },

        Commands::LoadModel { path } => {
            client.load_selected_model(&path).await?;
            Ok(format!("{} {}", "Loaded".green(), path.cyan()))
        }

        Commands::Prompt { model, text } => {
            client.load_selected_model(&model).await?;
            let response = stream_prompt(client, &text).await?;
            Ok(format!("{}", format!("({} chars)", response.len()).dimmed()))
        }

        Commands::Models => {
            let models = client.get_models().await?;
            Ok(format_models(&models))
        }

        Commands::AddModel {
            name,
            description,
            model_uri,
            config,
        } => {
            let fields = ModelFields {
                name: name.clone(),
                description,
                model_uri,
                config: config.map(|c| parse_json_arg(&c)).transpose()?,
                ..Default::default()
            };
            let id = client.add_model(fields).await?;
            Ok(format!("{} model {} ({})", "Added".green(), name.cyan(), id))
        }

        Commands::UpdateModel {
            id,
            name,
            description,
            model_uri,
        } => {
            let patch = ModelPatch {
                name,
                description,
                model_uri,
                ..Default::default()
            };
            client.update_model(&id, patch).await?;
            Ok(format!("{} model {}", "Updated".green(), id.cyan()))
        }

        Commands::DeleteModel { id } => {
            client.delete_model(&id).await?;
            Ok(format!("{} model {}", "Deleted".green(), id.cyan()))
        }

        Commands::GetPrompts { key } => match client.get_prompts(&key).await? {
            Some(value) => Ok(format_json(&value)),
            None => Ok(format!("{}: no prompts stored under {}", "Warning".yellow(), key)),
        },

        Commands::SetPrompts { key, value } => {
            client.set_prompts(&key, parse_json_arg(&value)?).await?;
            Ok(format!("{} prompts {}", "Stored".green(), key.cyan()))
        }

        Commands::AddChat {
            model,
            message,
            response,
        } => {
            let id = client
                .add_chat_message(&model, &message, response.as_deref())
                .await?;
            Ok(format!("{} chat message {}", "Added".green(), id))
        }

        Commands::History { model } => {
            let history = client.get_chat_history(&model).await?;
            Ok(format_history(&history))
        }
    }
}

/// Sends a prompt, printing the response as it streams in.
pub async fn stream_prompt(client: &Client, text: &str) -> Result<String, Box<dyn std::error::Error>> {
    let mut states = client.watch_llm_state();
    let _ = states.borrow_and_update();
    let mut printed = 0;

    let call = client.prompt(text);
    tokio::pin!(call);
    let response = loop {
        tokio::select! {
            result = &mut call => break result?,
            changed = states.changed() => {
                if changed.is_err() {
                    break (&mut call).await?;
                }
                let partial = model_reply(&states.borrow_and_update());
                if let Some(partial) = partial {
                    if partial.len() > printed && partial.is_char_boundary(printed) {
                        print!("{}", &partial[printed..]);
                        let _ = std::io::stdout().flush();
                        printed = partial.len();
                    }
                }
            }
        }
    };

    if response.len() > printed && response.is_char_boundary(printed) {
        print!("{}", &response[printed..]);
    }
    println!();
    Ok(response)
}

/// Text of the model's reply in progress, if the last chat item is one.
fn model_reply(state: &LlmState) -> Option<String> {
    state
        .chat_session
        .simplified_chat
        .last()
        .filter(|item| item.kind == ChatItemKind::Model)
        .map(|item| item.message.clone())
}

/// Formats the model control state for display.
pub fn format_state(state: &LlmState) -> String {
    let model = match (&state.model.name, state.model.loaded) {
        (Some(name), true) => format!("{} {}", name.cyan(), "(loaded)".green()),
        (Some(name), false) => format!("{} ({:.0}%)", name.cyan(), state.model.load_progress * 100.0),
        (None, _) => "none".dimmed().to_string(),
    };
    let mut output = format!("  Model: {}\n", model);
    if let Some(error) = state.error() {
        output.push_str(&format!("  Error: {}\n", error.red()));
    }
    output.push_str(&format!(
        "  Chat: {} items{}",
        state.chat_session.simplified_chat.len(),
        if state.chat_session.generating_result {
            " (generating)".yellow().to_string()
        } else {
            String::new()
        }
    ));
    if !state.chat_session.draft_prompt.completion.is_empty() {
        output.push_str(&format!(
            "\n  Suggestion: {}{}",
            state.chat_session.draft_prompt.prompt,
            state.chat_session.draft_prompt.completion.dimmed()
        ));
    }
    output
}

pub fn format_selection(selection: Option<DialogSelection>) -> String {
    match selection {
        Some(selection) => selection
            .into_paths()
            .iter()
            .map(|p| format!("  {}", p.cyan()))
            .collect::<Vec<_>>()
            .join("\n"),
        None => "Cancelled".yellow().to_string(),
    }
}

pub fn format_models(models: &[Model]) -> String {
    if models.is_empty() {
        return "No models stored".yellow().to_string();
    }
    let mut output = String::new();
    for model in models {
        output.push_str(&format!("  {} {}", model.id.dimmed(), model.name.cyan()));
        if let Some(uri) = &model.model_uri {
            output.push_str(&format!(" [{}]", uri));
        }
        output.push('\n');
    }
    output
}

pub fn format_history(history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return "No chat history".yellow().to_string();
    }
    let mut output = String::new();
    for entry in history {
        output.push_str(&format!(
            "[{}] {} {}\n",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            ">".cyan(),
            entry.message
        ));
        if let Some(response) = &entry.response {
            output.push_str(&format!("    {}\n", response));
        }
    }
    output
}

/// Parses a JSON argument (either inline JSON or @file.json).
pub fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}

/// Formats JSON for display.
pub fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
