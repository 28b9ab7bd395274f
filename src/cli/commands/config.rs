use clap::Subcommand;
use serde_json::{json, Value};

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::{config, AppConfig};

#[derive(Subcommand)]
pub enum ConfigCommands {
    #[command(about = "Show the effective configuration (secrets masked)")]
    Show,
}

pub async fn handle(cmd: ConfigCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let shown = masked(config())?;
            match output_format {
                OutputFormat::Json => output_success(output_format, "Effective configuration", Some(json!({ "config": shown }))),
                OutputFormat::Text => {
                    println!("{}", serde_json::to_string_pretty(&shown)?);
                    Ok(())
                }
            }
        }
    }
}

fn masked(cfg: &AppConfig) -> anyhow::Result<Value> {
    let mut value = serde_json::to_value(cfg)?;
    if let Some(secret) = value.pointer_mut("/security/token_secret") {
        if secret.as_str().is_some_and(|s| !s.is_empty()) {
            *secret = json!("********");
        }
    }
    Ok(value)
}
