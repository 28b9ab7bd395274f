//! Per-request state.
//!
//! A [`RequestContext`] is created for every request that reaches the UI
//! pipeline, handed to the menu handlers as `&mut`, and finally turned into
//! an HTTP response by [`RequestContext::flush`]. Nothing in it is shared
//! with other requests; process-wide services live on [`Portal`].

mod crumbs;
mod csrf;
mod flush;
pub mod form_data;
mod page;
mod session;

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode, Uri};
use percent_encoding::percent_decode_str;
use tracing::error;

use crate::auth::UserRecord;
use crate::error::PortalError;
use crate::menu::Menu;
use crate::net::{is_loopback, parse_client_ip, ClientAddr, ClientIpError};
use crate::perms::{check_perms, Caller, Perm, PermDenied, SelectedGroup, SelectedUser};
use crate::portal::Portal;

pub use crumbs::Crumbs;
pub use flush::Expiry;
pub use form_data::{FormBodyError, FormData, UploadedFile};

use flush::Staged;
use session::TokenState;

pub struct RequestContext {
    portal: Arc<Portal>,

    method: Method,
    host: String,
    fullpath: String,
    /// Request path as received, still percent-encoded.
    raw_path: String,
    raw_query: String,
    args: Vec<(String, String)>,
    headers: HeaderMap,
    form: FormData,

    path: Vec<String>,
    /// Segments already consumed by menu descent, joined with `/`.
    pub subpath: String,

    client: ClientAddr,
    user: Option<UserRecord>,
    sysadmin: bool,
    selected_user: Option<SelectedUser>,
    selected_group: Option<SelectedGroup>,
    token: TokenState,

    staged: Staged,
    crumbs: Crumbs,
    page_menu: Option<Menu>,
    page_menu_depth: usize,
    csrf_checked: Option<bool>,
    client_gone: Arc<AtomicBool>,
    flushed: bool,
}

/// Split a raw request path into menu segments. `%2F` inside a segment
/// stays part of that segment and `%B6` is dropped.
pub fn split_path(raw: &str) -> Vec<String> {
    raw.split('/')
        .skip(1)
        .map(|seg| {
            let seg = seg
                .replace("%2F", "/")
                .replace("%2f", "/")
                .replace("%B6", "")
                .replace("%b6", "");
            percent_decode_str(&seg).decode_utf8_lossy().into_owned()
        })
        .collect()
}

impl RequestContext {
    /// Build a context from a live request; POST and PUT bodies are read
    /// here so that handlers can look at form values synchronously.
    pub async fn accept(portal: Arc<Portal>, remote: SocketAddr, req: Request<Body>) -> Result<Self, PortalError> {
        let (parts, body) = req.into_parts();

        let form = if parts.method == Method::POST || parts.method == Method::PUT {
            let mut body_req = Request::new(body);
            *body_req.headers_mut() = parts.headers.clone();
            FormData::from_request(body_req)
                .await
                .map_err(|e| PortalError::invalid_input(e.to_string()))?
        } else {
            FormData::new()
        };

        Ok(Self::from_parts(
            portal,
            parts.method,
            &parts.uri,
            parts.headers,
            &remote.to_string(),
            form,
        )?)
    }

    pub fn from_parts(
        portal: Arc<Portal>,
        method: Method,
        uri: &Uri,
        headers: HeaderMap,
        remote: &str,
        form: FormData,
    ) -> Result<Self, ClientIpError> {
        let xff = headers
            .get_all("x-forwarded-for")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(", ");
        let client = parse_client_ip(remote, &xff, &portal.trusted)?;

        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.to_string()))
            .unwrap_or_else(|| portal.config.server.http_host.clone());

        let raw_path = uri.path();
        let raw_query = uri.query().unwrap_or_default().to_string();

        Ok(Self {
            method,
            host,
            fullpath: percent_decode_str(raw_path).decode_utf8_lossy().into_owned(),
            raw_path: raw_path.to_string(),
            args: url::form_urlencoded::parse(raw_query.as_bytes())
                .into_owned()
                .collect(),
            raw_query,
            headers,
            form,
            path: split_path(raw_path),
            subpath: String::new(),
            client,
            user: None,
            sysadmin: false,
            selected_user: None,
            selected_group: None,
            token: TokenState::default(),
            staged: Staged::default(),
            crumbs: Crumbs::default(),
            page_menu: None,
            page_menu_depth: 0,
            csrf_checked: None,
            client_gone: Arc::new(AtomicBool::new(false)),
            flushed: false,
            portal,
        })
    }

    pub fn portal(&self) -> &Arc<Portal> {
        &self.portal
    }

    // Request

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    pub fn is_post(&self) -> bool {
        self.method == Method::POST
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    pub fn form(&self) -> &FormData {
        &self.form
    }

    /// Primary language tag from `Accept-Language`.
    pub fn language(&self) -> String {
        let lang = self
            .header("accept-language")
            .split([',', ';'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        if lang.is_empty() || lang == "*" {
            "en".to_string()
        } else {
            lang
        }
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent")
    }

    // Path

    pub fn fullpath(&self) -> &str {
        &self.fullpath
    }

    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    /// Full path plus query string.
    pub fn full_url(&self) -> String {
        if self.raw_query.is_empty() {
            self.fullpath.clone()
        } else {
            format!("{}?{}", self.fullpath, self.raw_query)
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn set_path(&mut self, path: Vec<String>) {
        self.path = path;
    }

    pub fn consume_segment(&mut self) {
        if self.path.is_empty() {
            return;
        }
        let seg = self.path.remove(0);
        if !self.subpath.is_empty() {
            self.subpath.push('/');
        }
        self.subpath.push_str(&seg);
    }

    /// More to descend into than a trailing slash.
    pub fn has_subs(&self) -> bool {
        match self.path.as_slice() {
            [] => false,
            [only] => !only.is_empty(),
            _ => true,
        }
    }

    // Query arguments

    /// Query argument without any CSRF check; `""` when absent.
    pub fn get_arg(&self, key: &str) -> String {
        self.args
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    /// Whether `key` was passed in the query or the form at all.
    pub fn query_arg_set(&self, key: &str) -> bool {
        self.args.iter().any(|(k, _)| k.eq_ignore_ascii_case(key)) || self.form.contains(key)
    }

    // Identity

    pub fn client_ip(&self) -> IpAddr {
        self.client.ip
    }

    pub fn client_chain(&self) -> &str {
        &self.client.chain
    }

    pub fn is_loopback(&self) -> bool {
        is_loopback(&self.client.ip)
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn the_user(&self) -> Option<&UserRecord> {
        self.user.as_ref()
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.username.as_str())
    }

    /// The sysadmin bit, honouring the configured source restriction.
    pub fn is_sysadmin(&self) -> bool {
        if !self.sysadmin || self.user.is_none() {
            return false;
        }

        let restrict = &self.portal.sysadmin_restrict;
        restrict.is_empty() || self.is_loopback() || restrict.contains(&self.client.ip)
    }

    pub fn selected_user(&self) -> Option<&SelectedUser> {
        self.selected_user.as_ref()
    }

    pub fn selected_group(&self) -> Option<&SelectedGroup> {
        self.selected_group.as_ref()
    }

    pub fn set_selected_group(&mut self, group: Option<SelectedGroup>) {
        self.selected_group = group;
    }

    pub fn caller(&self) -> Caller {
        Caller {
            username: self.username().map(str::to_string),
            sysadmin: self.is_sysadmin(),
            can_be_sysadmin: self.user.as_ref().map(|u| u.can_be_sysadmin).unwrap_or(false),
            loopback: self.is_loopback(),
            bearer_auth: self.token.bearer_auth,
            selected_user: self.selected_user.clone(),
            selected_group: self.selected_group.clone(),
        }
    }

    pub fn check_perms(&self, what: &str, perms: Perm) -> Result<(), PermDenied> {
        check_perms(
            &self.caller(),
            &self.portal.config.features,
            self.portal.perm_hook.as_ref(),
            what,
            perms,
        )
    }

    /// Select the user named by the path, then check that the caller may
    /// look at them.
    pub async fn select_user(&mut self, username: &str, perms: Perm) -> Result<UserRecord, PortalError> {
        let users = Arc::clone(&self.portal.users);
        let user = users.refresh(username).await.map_err(|e| {
            error!("SelectUser({}): {}", username, e);
            PortalError::not_found("No such user")
        })?;

        self.selected_user = Some(SelectedUser {
            username: user.username.clone(),
            shares_group: false,
        });

        if let Err(err) = self.check_perms(&format!("SelectUser({})", username), perms) {
            self.selected_user = None;
            return Err(PortalError::from_denied(err, self.is_logged_in()));
        }

        Ok(user)
    }

    // Disconnect

    /// Handle the server side sets once the client has gone away.
    pub fn abort_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.client_gone)
    }

    pub fn client_gone(&self) -> bool {
        self.client_gone.load(Ordering::Relaxed)
    }

    // Output

    pub fn out(&mut self, text: &str) {
        self.staged.out.push_str(text);
    }

    pub fn outln(&mut self, text: &str) {
        self.staged.out.push_str(text);
        self.staged.out.push('\n');
    }

    pub fn buffered(&self) -> &str {
        &self.staged.out
    }

    pub fn status(&self) -> StatusCode {
        self.staged.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.staged.status = status;
    }

    // Page menu

    pub fn set_page_menu(&mut self, menu: Option<Menu>) {
        self.page_menu = menu;
        self.page_menu_depth = 0;
    }

    pub fn page_menu_descend(&mut self) {
        self.page_menu_depth += 1;
    }
}
