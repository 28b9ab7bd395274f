use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use portal_core::auth::StaticUserDirectory;
use portal_core::portal::Portal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up PORTAL_* settings
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = portal_core::config::config().clone();
    info!("Starting portal in {:?} mode", config.environment);
    if portal_core::is_production!() && config.security.token_secret.is_empty() {
        warn!("PORTAL_TOKEN_SECRET is not set; sessions are lost on every restart");
    }
    if portal_core::is_development!() && config.security.enable_cors {
        info!("CORS enabled for {:?}", config.security.cors_origins);
    }

    let users = match std::env::var("PORTAL_USERS") {
        Ok(spec) => StaticUserDirectory::from_spec(&spec),
        Err(_) => {
            warn!("PORTAL_USERS is not set, nobody can log in");
            StaticUserDirectory::new()
        }
    };

    let port = config.server.port;
    let iptrk_every = Duration::from_secs(config.iptrk.sweep_secs.max(1));
    let iptrk_idle = chrono::Duration::minutes(config.iptrk.expire_minutes);

    let portal = Arc::new(
        Portal::builder(config)
            .users(Arc::new(users))
            .build()
            .context("failed to build portal")?,
    );

    portal.access_log.start().context("failed to open access log")?;
    portal.iptrk.spawn_sweeper(iptrk_every, iptrk_idle);
    spawn_revocation_sweeper(Arc::clone(&portal), iptrk_every);

    let app = portal_core::app::router(Arc::clone(&portal));

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    info!("Portal listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server")?;

    portal.access_log.stop().await;
    info!("Portal stopped");
    Ok(())
}

fn spawn_revocation_sweeper(portal: Arc<Portal>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let dropped = portal.tokens.revocations().expire(chrono::Utc::now().timestamp());
            if dropped > 0 {
                tracing::debug!("Dropped {} expired revocations", dropped);
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
