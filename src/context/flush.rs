//! Response staging and the single terminal flush.

use axum::body::Body;
use axum::http::header::{self, HeaderName};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{debug, error};

use super::session::put_header;
use super::RequestContext;
use crate::access_log::AccessRecord;
use crate::auth::cookie::PAST_HTTP_DATE;
use crate::error::PortalError;

const NEVER_CACHE: &str = "no-cache, no-store, max-age=0, must-revalidate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Explicitly expired: same headers as the never-cache default.
    Never,
    In(i64),
}

#[derive(Debug)]
pub(super) struct Staged {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub out: String,
    pub raw: Option<Vec<u8>>,
    pub static_file: Option<String>,
    pub redirect: Option<String>,
    pub content_type: Option<String>,
    pub expires: Option<Expiry>,
    pub return_code: Option<i32>,
    pub template: Option<(String, Value)>,
}

impl Default for Staged {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            out: String::new(),
            raw: None,
            static_file: None,
            redirect: None,
            content_type: None,
            expires: None,
            return_code: None,
            template: None,
        }
    }
}

fn http_date(minutes: i64) -> String {
    (Utc::now() + Duration::minutes(minutes))
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

impl RequestContext {
    /// Stage a redirect. Paths starting with `?` or `#` are relative to
    /// the current page.
    pub fn set_redirect(&mut self, path: &str, status: StatusCode) {
        if path.is_empty() {
            error!("SetRedirect() with empty path, programmer mistake!");
            return;
        }

        let target = if path.starts_with('?') || path.starts_with('#') {
            format!("{}{}", self.fullpath, path)
        } else {
            path.to_string()
        };

        self.staged.redirect = Some(target);
        self.staged.status = status;
    }

    pub fn redirect_target(&self) -> Option<&str> {
        self.staged.redirect.as_deref()
    }

    pub fn set_content_type(&mut self, ctype: &str) {
        let ctype = match ctype {
            "text/html" | "text/markdown" => format!("{}; charset=utf-8", ctype),
            other => other.to_string(),
        };
        self.staged.content_type = Some(ctype);
    }

    pub fn content_type(&self) -> Option<&str> {
        self.staged.content_type.as_deref()
    }

    pub fn set_file_name(&mut self, name: &str) {
        self.set_header("content-disposition", &format!("inline; filename=\"{}\"", name));
    }

    pub fn set_expires(&mut self, minutes: i64) {
        self.staged.expires = Some(Expiry::In(minutes));
    }

    pub fn set_expired(&mut self) {
        self.staged.expires = Some(Expiry::Never);
    }

    /// Serve `path` (relative to the static root) instead of a body.
    /// Serve `path` from the static root instead of a page. The path is a
    /// URL path relative to that root, percent-encoded as on the wire.
    pub fn set_static_file(&mut self, path: &str) {
        self.staged.static_file = Some(path.to_string());
    }

    pub fn static_file(&self) -> Option<&str> {
        self.staged.static_file.as_deref()
    }

    pub fn set_raw(&mut self, bytes: Vec<u8>) {
        self.staged.raw = Some(bytes);
    }

    pub fn set_json(&mut self, value: &Value) {
        self.set_content_type("application/json");
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set_raw(bytes),
            Err(e) => error!("JSON encoding failed: {}", e),
        }
    }

    /// The standard `{"Status": .., "Message": ..}` answer.
    pub fn json_answer(&mut self, status: &str, message: &str) {
        self.set_json(&json!({ "Status": status, "Message": message }));
    }

    /// Shell-style exit status, reported in `X-ReturnCode`.
    pub fn set_return_code(&mut self, code: i32) {
        self.staged.return_code = Some(code);
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        match HeaderName::from_bytes(name.as_bytes()) {
            Ok(name) => put_header(&mut self.staged.headers, name, value, true),
            Err(_) => error!("Invalid header name {:?}", name),
        }
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        match HeaderName::from_bytes(name.as_bytes()) {
            Ok(name) => put_header(&mut self.staged.headers, name, value, false),
            Err(_) => error!("Invalid header name {:?}", name),
        }
    }

    fn access_record(&self) -> AccessRecord {
        let now = Utc::now();
        AccessRecord {
            epoch: now.timestamp(),
            timestamp: now.format(&self.portal.config.ui.time_format).to_string(),
            username: self.username().unwrap_or_default().to_string(),
            nodename: self.portal.config.server.nodename.clone(),
            ip: self.client.ip.to_string(),
            xff: self.client.chain.clone(),
            method: self.method.to_string(),
            host: self.host.clone(),
            path: self.fullpath.clone(),
            args: self.raw_query.clone(),
            template: self.template_name().unwrap_or_default().to_string(),
            static_file: self.staged.static_file.clone().unwrap_or_default(),
        }
    }

    /// Turn everything staged on this context into the HTTP response.
    pub async fn flush(&mut self) -> Result<Response, PortalError> {
        if self.flushed {
            error!("Flushed again, programmer mistake!");
            return Err(PortalError::programmer("Flushed again"));
        }
        self.flushed = true;

        let record = self.access_record();
        self.portal.access_log.log(&record).await;

        let mut headers = std::mem::take(&mut self.staged.headers);

        put_header(&mut headers, header::X_CONTENT_TYPE_OPTIONS, "nosniff", false);
        put_header(&mut headers, header::X_FRAME_OPTIONS, "SAMEORIGIN", false);
        put_header(&mut headers, header::X_XSS_PROTECTION, "1; mode=block", false);
        let csp = self.portal.config.security.csp.clone();
        if !csp.is_empty() {
            put_header(&mut headers, header::CONTENT_SECURITY_POLICY, &csp, false);
        }

        match self.staged.expires {
            Some(Expiry::In(minutes)) => put_header(&mut headers, header::EXPIRES, &http_date(minutes), false),
            Some(Expiry::Never) => never_cache(&mut headers),
            None if self.staged.static_file.is_none() => never_cache(&mut headers),
            None => {}
        }

        if let Some(code) = self.staged.return_code {
            put_header(&mut headers, HeaderName::from_static("x-returncode"), &code.to_string(), false);
        }

        if let Some(ctype) = &self.staged.content_type {
            put_header(&mut headers, header::CONTENT_TYPE, ctype, false);
        }

        if let Some(file) = self.staged.static_file.clone() {
            return Ok(self.serve_static(&file, headers).await);
        }

        self.emit_token(&mut headers);

        if let Some(target) = self.staged.redirect.clone() {
            put_header(&mut headers, header::LOCATION, &target, false);
            return Ok((self.staged.status, headers).into_response());
        }

        let status = self.staged.status;
        if status == StatusCode::UNAUTHORIZED {
            let realm = format!("Bearer realm=\"{}\"", self.portal.config.server.system_name);
            put_header(&mut headers, header::WWW_AUTHENTICATE, &realm, false);
        }

        let mut body = std::mem::take(&mut self.staged.out).into_bytes();
        if let Some(raw) = self.staged.raw.take() {
            body.extend_from_slice(&raw);
        }

        if let Some((name, data)) = self.staged.template.take() {
            self.render_into(&name, &data, &mut body);
        }

        Ok((status, headers, body).into_response())
    }

    fn render_into(&mut self, name: &str, data: &Value, body: &mut Vec<u8>) {
        match self.portal.templates.render(name, data) {
            Ok(html) => body.extend_from_slice(html.as_bytes()),
            Err(e) if self.client_gone() => {
                debug!("Client went away while rendering {}: {}", name, e);
            }
            Err(e) => {
                error!("Rendering template {} failed: {}", name, e);

                self.set_page_menu(None);
                let data = self
                    .page_def()
                    .with(json!({ "messages": ["(internal error: Template rendering failed)"] }));
                match self.portal.templates.render("misc/error.tmpl", &data) {
                    Ok(html) => body.extend_from_slice(html.as_bytes()),
                    Err(e) => error!("Rendering error template failed: {}", e),
                }
            }
        }
    }

    async fn serve_static(&self, file: &str, headers: HeaderMap) -> Response {
        if file.ends_with('/') {
            return (StatusCode::FORBIDDEN, headers, "Forbidden").into_response();
        }

        let method = if self.method == Method::HEAD { Method::HEAD } else { Method::GET };
        let uri = format!("/{}", file.trim_start_matches('/'));
        let req = match Request::builder().method(method).uri(uri.as_str()).body(Body::empty()) {
            Ok(req) => req,
            Err(e) => {
                error!("Static file {:?} is not a valid path: {}", file, e);
                return (StatusCode::NOT_FOUND, headers, "Not Found").into_response();
            }
        };

        let served = ServeDir::new(&self.portal.config.server.static_root).oneshot(req).await;
        let mut resp = match served {
            Ok(resp) => resp.into_response(),
            Err(never) => match never {},
        };
        resp.headers_mut().extend(headers);
        resp
    }
}

fn never_cache(headers: &mut HeaderMap) {
    put_header(headers, header::EXPIRES, PAST_HTTP_DATE, false);
    put_header(headers, header::CACHE_CONTROL, NEVER_CACHE, false);
    put_header(headers, header::PRAGMA, "no-cache", false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_context, test_portal, test_portal_with};
    use axum::body::to_bytes;

    async fn body_text(resp: Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_security_and_cache_headers() {
        let portal = test_portal();
        let mut ctx = test_context(&portal, "GET", "/");
        ctx.out("hello");
        ctx.set_return_code(3);
        let resp = ctx.flush().await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let h = resp.headers();
        assert_eq!(h["x-content-type-options"], "nosniff");
        assert_eq!(h["x-frame-options"], "SAMEORIGIN");
        assert_eq!(h["x-xss-protection"], "1; mode=block");
        assert_eq!(h["content-security-policy"], "default-src 'self'");
        assert_eq!(h["cache-control"], NEVER_CACHE);
        assert_eq!(h["expires"], PAST_HTTP_DATE);
        assert_eq!(h["x-returncode"], "3");
        assert_eq!(body_text(resp).await, "hello");
    }

    #[tokio::test]
    async fn test_double_flush_is_rejected() {
        let portal = test_portal();
        let mut ctx = test_context(&portal, "GET", "/");
        ctx.flush().await.unwrap();
        assert!(matches!(ctx.flush().await, Err(PortalError::Programmer(_))));
    }

    #[tokio::test]
    async fn test_expires_in_minutes() {
        let portal = test_portal();
        let mut ctx = test_context(&portal, "GET", "/");
        ctx.set_expires(60);
        let resp = ctx.flush().await.unwrap();
        assert!(resp.headers().get("cache-control").is_none());
        assert!(resp.headers()["expires"].to_str().unwrap().ends_with(" GMT"));
    }

    #[tokio::test]
    async fn test_redirect() {
        let portal = test_portal();
        let mut ctx = test_context(&portal, "GET", "/login/");
        ctx.set_redirect("?comeback=1", StatusCode::SEE_OTHER);
        ctx.out("ignored");
        let resp = ctx.flush().await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()["location"], "/login/?comeback=1");
        assert_eq!(body_text(resp).await, "");
    }

    #[tokio::test]
    async fn test_empty_redirect_is_ignored() {
        let portal = test_portal();
        let mut ctx = test_context(&portal, "GET", "/");
        ctx.set_redirect("", StatusCode::FOUND);
        assert!(ctx.redirect_target().is_none());
        assert_eq!(ctx.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unauthorized_carries_challenge() {
        let portal = test_portal();
        let mut ctx = test_context(&portal, "GET", "/");
        ctx.set_status(StatusCode::UNAUTHORIZED);
        let resp = ctx.flush().await.unwrap();
        assert_eq!(resp.headers()["www-authenticate"], "Bearer realm=\"Portal\"");
    }

    #[tokio::test]
    async fn test_json_and_raw() {
        let portal = test_portal();
        let mut ctx = test_context(&portal, "GET", "/api/");
        ctx.json_answer("ok", "done");
        let resp = ctx.flush().await.unwrap();
        assert_eq!(resp.headers()["content-type"], "application/json");
        let v: Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(v, json!({"Status": "ok", "Message": "done"}));
    }

    #[tokio::test]
    async fn test_template_render_and_failure() {
        let portal = test_portal();
        let mut ctx = test_context(&portal, "GET", "/");
        let data = ctx.page_def().with(json!({}));
        ctx.page_show("index.tmpl", data);
        let resp = ctx.flush().await.unwrap();
        assert!(body_text(resp).await.contains("<div class=\"home\">"));

        let mut ctx = test_context(&portal, "GET", "/");
        ctx.out("partial ");
        ctx.page_show("does/not/exist.tmpl", json!({}));
        let body = body_text(ctx.flush().await.unwrap()).await;
        assert!(body.starts_with("partial "));
        assert!(body.contains("(internal error: Template rendering failed)"));
    }

    #[tokio::test]
    async fn test_static_file() {
        let root = std::env::temp_dir().join(format!("portal-static-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join("css")).unwrap();
        std::fs::write(root.join("css/style.css"), "body{}").unwrap();

        let mut config = crate::config::AppConfig::development();
        config.server.static_root = root.display().to_string();
        let portal = test_portal_with(config);

        let mut ctx = test_context(&portal, "GET", "/css/style.css");
        ctx.set_static_file("css/style.css");
        ctx.set_expires(60);
        let resp = ctx.flush().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-frame-options"], "SAMEORIGIN");
        assert!(resp.headers().get("pragma").is_none());
        assert_eq!(body_text(resp).await, "body{}");

        let mut ctx = test_context(&portal, "GET", "/css/");
        ctx.set_static_file("css/");
        assert_eq!(ctx.flush().await.unwrap().status(), StatusCode::FORBIDDEN);

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_static_file_with_encoded_name() {
        let root = std::env::temp_dir().join(format!("portal-static-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join("css")).unwrap();
        std::fs::write(root.join("css/my file.css"), "p{}").unwrap();
        std::fs::write(root.join("css/caf\u{e9}.css"), "h1{}").unwrap();

        let mut config = crate::config::AppConfig::development();
        config.server.static_root = root.display().to_string();
        let portal = test_portal_with(config);

        let mut ctx = test_context(&portal, "GET", "/css/my%20file.css");
        assert_eq!(ctx.fullpath(), "/css/my file.css");
        let file = ctx.raw_path().trim_start_matches('/').to_string();
        ctx.set_static_file(&file);
        let resp = ctx.flush().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "p{}");

        let mut ctx = test_context(&portal, "GET", "/css/caf%C3%A9.css");
        ctx.set_static_file("css/caf%C3%A9.css");
        let resp = ctx.flush().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "h1{}");

        let mut ctx = test_context(&portal, "GET", "/css/../../etc/passwd");
        ctx.set_static_file("css/../../etc/passwd");
        assert_eq!(ctx.flush().await.unwrap().status(), StatusCode::NOT_FOUND);

        std::fs::remove_dir_all(&root).ok();
    }
}
