use anyhow::Context;
use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::config;
use crate::net::{parse_client_ip, TrustedProxies};

#[derive(Subcommand)]
pub enum IpCommands {
    #[command(about = "Resolve the client address for a peer and X-Forwarded-For value")]
    Resolve {
        #[arg(help = "Socket peer as host:port")]
        remote: String,
        #[arg(long, default_value = "", help = "X-Forwarded-For header value")]
        xff: String,
        #[arg(long, value_delimiter = ',', help = "Trusted proxy CIDRs (defaults to the configured list)")]
        trusted: Option<Vec<String>>,
    },
}

pub async fn handle(cmd: IpCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        IpCommands::Resolve { remote, xff, trusted } => {
            let entries = trusted.unwrap_or_else(|| config().security.trusted_proxies.clone());
            let trusted = TrustedProxies::parse(&entries).context("invalid trusted proxy list")?;

            let addr = parse_client_ip(&remote, &xff, &trusted)?;
            output_success(
                output_format,
                &addr.ip.to_string(),
                Some(json!({ "client_ip": addr.ip.to_string(), "chain": addr.chain })),
            )
        }
    }
}
