use anyhow::bail;
use chrono::{TimeZone, Utc};
use clap::Subcommand;
use serde_json::{json, Map, Value};

use crate::auth::{NoClaims, TokenService};
use crate::cli::utils::{output_error, output_success};
use crate::cli::OutputFormat;
use crate::config::{config, AppConfig};

#[derive(Subcommand)]
pub enum TokenCommands {
    #[command(about = "Sign a token with the configured secret")]
    Mint {
        #[arg(help = "Token name (websession, oauth_access, ...)")]
        name: String,
        #[arg(help = "Subject, usually a username")]
        subject: String,
        #[arg(long, help = "Lifetime in minutes (defaults to the session expiry)")]
        minutes: Option<i64>,
    },

    #[command(about = "Verify a token and show its claims")]
    Inspect {
        #[arg(help = "The encoded token")]
        token: String,
        #[arg(help = "Expected token name")]
        name: String,
    },
}

pub async fn handle(cmd: TokenCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let cfg = config();
    let tokens = token_service(cfg)?;

    match cmd {
        TokenCommands::Mint { name, subject, minutes } => {
            let minutes = minutes.unwrap_or(cfg.security.token_expiry_minutes);
            let token = tokens.issue(&name, &subject, minutes, NoClaims {})?;
            output_success(
                output_format,
                &token,
                Some(json!({ "name": name, "subject": subject, "minutes": minutes, "token": token })),
            )
        }
        TokenCommands::Inspect { token, name } => match tokens.parse::<Map<String, Value>>(&token, &name) {
            Ok(parsed) => {
                let env = parsed.envelope;
                output_success(
                    output_format,
                    "Token is valid",
                    Some(json!({
                        "name": env.aud,
                        "subject": env.sub,
                        "issuer": env.iss,
                        "issued": format_ts(env.iat),
                        "expires": format_ts(env.exp),
                        "near_expiry": parsed.near_expiry,
                        "claims": env.claims,
                    })),
                )
            }
            Err(e) => {
                output_error(output_format, &e.to_string(), Some("INVALID_TOKEN"))?;
                bail!("{}", e)
            }
        },
    }
}

/// A CLI-side service must share the server's secret, otherwise minted
/// tokens are useless and nothing verifies.
fn token_service(cfg: &AppConfig) -> anyhow::Result<TokenService> {
    if cfg.security.token_secret.is_empty() {
        bail!("PORTAL_TOKEN_SECRET is not set");
    }
    Ok(TokenService::new(
        &cfg.security.token_secret,
        &cfg.server.nodename,
        cfg.security.token_refresh_minutes,
    ))
}

fn format_ts(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}
