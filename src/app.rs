//! HTTP router: liveness check plus the portal pipeline.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Method, Request},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, warn};

use crate::context::RequestContext;
use crate::error::PortalError;
use crate::handlers::h_root;
use crate::portal::Portal;

/// Build the application router. Every path except `/health` goes through
/// the portal pipeline.
pub fn router(portal: Arc<Portal>) -> Router {
    let cors = cors_layer(&portal);

    let mut app = Router::new()
        .route("/health", get(health))
        .fallback(portal_entry)
        .with_state(portal);

    if let Some(cors) = cors {
        app = app.layer(cors);
    }

    app.layer(TraceLayer::new_for_http())
}

fn cors_layer(portal: &Portal) -> Option<CorsLayer> {
    let security = &portal.config.security;
    if !security.enable_cors {
        return None;
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST]),
    )
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "data": {
            "status": "ok",
            "timestamp": chrono::Utc::now(),
        }
    }))
}

/// Marks the request's client as gone when dropped before [`disarm`].
///
/// [`disarm`]: ClientGuard::disarm
struct ClientGuard {
    gone: Arc<AtomicBool>,
    armed: bool,
}

impl ClientGuard {
    fn new(gone: Arc<AtomicBool>) -> Self {
        Self { gone, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        if self.armed {
            debug!("Client went away before the response was sent");
            self.gone.store(true, Ordering::Relaxed);
        }
    }
}

async fn portal_entry(
    State(portal): State<Arc<Portal>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    req: Request<Body>,
) -> Response {
    let ctx = match RequestContext::accept(portal, remote, req).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Request not accepted: {}", e);
            return e.into_response();
        }
    };

    let guard = ClientGuard::new(ctx.abort_signal());

    // The pipeline runs on its own task so that it finishes (and logs)
    // even when the client disconnects halfway.
    let task = tokio::spawn(handle(ctx));
    let resp = match task.await {
        Ok(resp) => resp,
        Err(e) => {
            error!("Request task failed: {}", e);
            PortalError::programmer("Request handling failed").into_response()
        }
    };

    guard.disarm();
    resp
}

async fn handle(mut ctx: RequestContext) -> Response {
    h_root(&mut ctx).await;

    match ctx.flush().await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}
