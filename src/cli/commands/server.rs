use std::time::Duration;

use anyhow::{bail, Context};
use clap::Subcommand;
use serde_json::{json, Value};

use crate::cli::utils::{output_error, output_success};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum ServerCommands {
    #[command(about = "Check server health status from the /health endpoint")]
    Health {
        #[arg(help = "Server base URL, e.g. http://127.0.0.1:3000")]
        url: String,
    },
}

pub async fn handle(cmd: ServerCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ServerCommands::Health { url } => {
            let target = health_url(&url)?;
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?;

            let resp = client
                .get(target.clone())
                .send()
                .await
                .with_context(|| format!("failed to reach {}", target))?;
            let status = resp.status();
            let body: Value = resp.json().await.unwrap_or(Value::Null);

            if status.is_success() && body["success"] == json!(true) {
                output_success(
                    output_format,
                    &format!("{} is up", url),
                    Some(json!({
                        "status": body["data"]["status"],
                        "timestamp": body["data"]["timestamp"],
                    })),
                )
            } else {
                output_error(output_format, &format!("{} answered HTTP {}", url, status), Some("UNHEALTHY"))?;
                bail!("server is not healthy")
            }
        }
    }
}

fn health_url(base: &str) -> anyhow::Result<url::Url> {
    let base = url::Url::parse(base).with_context(|| format!("invalid server URL {:?}", base))?;
    Ok(base.join("/health")?)
}
