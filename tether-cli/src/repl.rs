//! Interactive REPL.

use crate::commands::{
    format_history, format_json, format_models, format_selection, format_state, stream_prompt,
};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use serde_json::Value;
use tether_client::Client;
use tether_protocol::endpoint::database::{ModelFields, ModelPatch};
use tether_protocol::endpoint::file_dialog::{FileFilter, OpenDialogOptions};

const HELP_TEXT: &str = r#"
Available commands:
  help                            Show this help
  settings                        Show the host's settings

  open [ext,...]                  Open the file dialog
  select                          Pick a model file and load it
  load <path>                     Load a model file
  prompt <text>                   Prompt the loaded model
  stop                            Stop the running prompt
  reset                           Clear the chat session
  draft <text>                    Set the draft prompt
  state                           Show the model state

  models                          List stored models
  add-model <name>                Add a model record
  rename <id> <name>              Rename a model record
  delete <id>                     Delete a model record
  prompts <key>                   Read stored prompts
  set-prompts <key> <json>        Store prompts
  chat <model_id> <message>       Record a chat message
  history <model_id>              Show chat history

  quit, exit                      Exit the REPL
"#;

pub async fn run(client: &Client, host: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "tether CLI".bold().cyan());
    println!("Started host {}", host);

    // Fails fast if the host never came up
    let settings = client.get_settings().await?;
    println!(
        "{} (theme: {}, language: {})",
        "Connected!".green(),
        settings.theme,
        settings.language
    );

    // Create readline editor
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    // Load history
    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".tether_history"))
        .unwrap_or_else(|_| ".tether_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "tether>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(client, line).await {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break, // Exit command
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
                if client.is_closed() {
                    println!("{}", "Host closed the link".red());
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    // Save history
    let _ = rl.save_history(&history_path);
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

async fn execute_repl_command(
    client: &Client,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return Ok(Some(String::new()));
    }

    let cmd = parts[0].to_lowercase();
    let args = &parts[1..];
    let rest = args.join(" ");

    match cmd.as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "settings" | "s" => {
            let settings = client.get_settings().await?;
            Ok(Some(format!(
                "theme: {}, language: {}",
                settings.theme.to_string().yellow(),
                settings.language.yellow()
            )))
        }

        "open" | "o" => {
            let mut options = OpenDialogOptions::titled("Open");
            if let Some(exts) = args.first() {
                let exts: Vec<&str> = exts.split(',').collect();
                options = options.with_filter(FileFilter::new("Files", &exts));
            }
            let selection = client.show_open_dialog(options).await?;
            Ok(Some(format_selection(selection)))
        }

        "select" => match client.select_model_file_and_load().await? {
            Some(path) => Ok(Some(format!("{} {}", "Loaded".green(), path.cyan()))),
            None => Ok(Some("Cancelled".yellow().to_string())),
        },

        "load" | "l" => {
            if args.is_empty() {
                return Ok(Some("Usage: load <path>".to_string()));
            }
            client.load_selected_model(&rest).await?;
            Ok(Some(format!("{} {}", "Loaded".green(), rest.cyan())))
        }

        "prompt" | "p" => {
            if args.is_empty() {
                return Ok(Some("Usage: prompt <text>".to_string()));
            }
            stream_prompt(client, &rest).await?;
            Ok(Some(String::new()))
        }

        "stop" => {
            client.stop_active_prompt().await?;
            Ok(Some("Stopped".yellow().to_string()))
        }

        "reset" => {
            client.reset_chat_history().await?;
            Ok(Some("Chat cleared".green().to_string()))
        }

        "draft" => {
            client.set_draft_prompt(&rest).await?;
            Ok(Some(format_state(&client.llm_state())))
        }

        "state" => Ok(Some(format_state(&client.llm_state()))),

        "models" | "m" => {
            let models = client.get_models().await?;
            Ok(Some(format_models(&models)))
        }

        "add-model" | "am" => {
            if args.is_empty() {
                return Ok(Some("Usage: add-model <name>".to_string()));
            }
            let id = client.add_model(ModelFields::named(rest.clone())).await?;
            Ok(Some(format!("{} {} ({})", "Added".green(), rest.cyan(), id)))
        }

        "rename" => {
            if args.len() < 2 {
                return Ok(Some("Usage: rename <id> <name>".to_string()));
            }
            let name = args[1..].join(" ");
            client.update_model(args[0], ModelPatch::name(name)).await?;
            Ok(Some(format!("{} {}", "Renamed".green(), args[0].cyan())))
        }

        "delete" | "d" => {
            if args.is_empty() {
                return Ok(Some("Usage: delete <id>".to_string()));
            }
            client.delete_model(args[0]).await?;
            Ok(Some(format!("{} {}", "Deleted".green(), args[0].cyan())))
        }

        "prompts" => {
            if args.is_empty() {
                return Ok(Some("Usage: prompts <key>".to_string()));
            }
            match client.get_prompts(args[0]).await? {
                Some(value) => Ok(Some(format_json(&value))),
                None => Ok(Some("No prompts".yellow().to_string())),
            }
        }

        "set-prompts" => {
            if args.len() < 2 {
                return Ok(Some("Usage: set-prompts <key> <json>".to_string()));
            }
            let value: Value = serde_json::from_str(&args[1..].join(" "))?;
            client.set_prompts(args[0], value).await?;
            Ok(Some(format!("{} {}", "Stored".green(), args[0].cyan())))
        }

        "chat" => {
            if args.len() < 2 {
                return Ok(Some("Usage: chat <model_id> <message>".to_string()));
            }
            let id = client
                .add_chat_message(args[0], &args[1..].join(" "), None)
                .await?;
            Ok(Some(format!("{} {}", "Added".green(), id)))
        }

        "history" | "h" => {
            if args.is_empty() {
                return Ok(Some("Usage: history <model_id>".to_string()));
            }
            let history = client.get_chat_history(args[0]).await?;
            Ok(Some(format_history(&history)))
        }

        _ => Ok(Some(format!(
            "Unknown command: {}. Type 'help' for help.",
            cmd
        ))),
    }
}
