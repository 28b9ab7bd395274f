#![allow(dead_code)]

use std::net::SocketAddr;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::body::{to_bytes, Body};
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, Response};
use axum::Router;
use reqwest::StatusCode;
use tower::ServiceExt;

use portal_core::auth::StaticUserDirectory;
use portal_core::config::AppConfig;
use portal_core::portal::Portal;

/// Peer address every in-process request appears to come from.
pub const CLIENT: ([u8; 4], u16) = ([192, 0, 2, 10], 4711);

pub const HOST: &str = "localhost";

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        // Spawn the already-built binary; assumes the debug profile
        let mut cmd = Command::new("target/debug/portal-core");
        cmd.env("PORTAL_PORT", port.to_string())
            .env("PORTAL_USERS", "alice:wonderland")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        let url = format!("{}/health", self.base_url);
        while Instant::now() < deadline {
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

pub fn test_portal() -> Arc<Portal> {
    let users = StaticUserDirectory::from_spec("alice:wonderland,root:toor:admin");
    Arc::new(
        Portal::builder(AppConfig::development())
            .users(Arc::new(users))
            .build()
            .expect("portal"),
    )
}

/// The full router wired to `portal`, answering as if called from [`CLIENT`].
pub fn app(portal: &Arc<Portal>) -> Router {
    portal_core::app::router(Arc::clone(portal)).layer(MockConnectInfo(SocketAddr::from(CLIENT)))
}

pub fn client_ip() -> std::net::IpAddr {
    SocketAddr::from(CLIENT).ip()
}

pub async fn send(app: Router, req: Request<Body>) -> Response<Body> {
    app.oneshot(req).await.expect("router is infallible")
}

pub async fn body_text(resp: Response<Body>) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
    String::from_utf8_lossy(&bytes).into_owned()
}

pub fn get(path: &str) -> Request<Body> {
    Request::get(path).header("host", HOST).body(Body::empty()).expect("request")
}

pub fn post_form(path: &str, pairs: &[(&str, &str)], cookie: Option<&str>) -> Request<Body> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    let mut req = Request::post(path)
        .header("host", HOST)
        .header("content-type", "application/x-www-form-urlencoded");
    if let Some(c) = cookie {
        req = req.header("cookie", c);
    }
    req.body(Body::from(body)).expect("request")
}

/// Session cookie for `user` signed by `portal`.
pub fn session_cookie(portal: &Portal, user: &str) -> String {
    let tok = portal
        .tokens
        .issue(
            portal_core::auth::SESSION_TOKEN,
            user,
            20,
            portal_core::auth::SessionClaims::default(),
        )
        .expect("token");
    format!("{}={}", portal.cookie.name, tok)
}

/// Pull the CSRF token out of a rendered form.
pub fn extract_csrf(html: &str) -> Option<String> {
    let marker = "name=\"pfCSRF\" value=\"";
    let start = html.find(marker)? + marker.len();
    let end = html[start..].find('"')?;
    Some(html[start..start + end].to_string())
}
