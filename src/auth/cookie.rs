//! Session cookie handling.

use axum::http::{header, HeaderMap};

/// Expiry stamp used for invalidated cookies and never-cache responses.
pub const PAST_HTTP_DATE: &str = "Thu, 01 Jan 2015 01:05:03 GMT";

/// Cookie carrying the session token.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    pub name: String,
    pub secure: bool,
    pub path: String,
}

impl SessionCookie {
    pub fn new(name: &str, secure: bool) -> Self {
        Self {
            name: name.to_lowercase(),
            secure,
            path: "/".to_string(),
        }
    }

    /// `Set-Cookie` value installing `token`.
    pub fn build_set_cookie(&self, token: &str) -> String {
        let mut cookie = format!("{}={}; Path={}; HttpOnly", self.name, token, self.path);
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value that makes the browser drop the session.
    pub fn build_invalidate_cookie(&self) -> String {
        let mut cookie = format!(
            "{}=invalid; Path={}; Expires={}; Max-Age=0; HttpOnly",
            self.name, self.path, PAST_HTTP_DATE
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    pub fn extract(&self, headers: &HeaderMap) -> Option<String> {
        extract_cookie(headers, &self.name)
    }
}

/// Extract a cookie value from headers. Every `Cookie` header is searched.
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|cookie| {
            let (key, value) = cookie.trim().split_once('=')?;

            if key == name {
                Some(value.to_string())
            } else {
                None
            }
        })
}
