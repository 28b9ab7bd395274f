use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::token::{TokenError, TokenService};
use crate::form::html::attr;

/// Form field carrying the token; also the token name (audience).
pub const CSRF_TOKEN_NAME: &str = "pfCSRF";

/// Header alternative to the form field, used by scripted clients.
pub const CSRF_HEADER: &str = "X-XSRF-TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CsrfClaims {
    pub method: String,
    pub host: String,
    pub path: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CsrfError {
    #[error("Missing CSRF token")]
    Missing,

    #[error("CSRF token rejected: {0}")]
    Token(#[from] TokenError),

    #[error("CSRF check failed: wrong user, {token:?} (token) vs {provided:?} (provided)")]
    WrongUser { token: String, provided: String },

    #[error("CSRF check failed: wrong host, {token:?} (token) vs {provided:?} (provided)")]
    WrongHost { token: String, provided: String },

    #[error("CSRF check failed: wrong path, {token:?} (token) vs {provided:?} (provided)")]
    WrongPath { token: String, provided: String },
}

/// The path prefix a token binds to. The request path is cut back to its
/// directory; a relative action URL is appended, an absolute one replaces
/// it, and an empty or query-only one leaves the directory as is.
pub fn csrf_path(fullpath: &str, url: &str) -> String {
    let mut path = fullpath.to_string();
    if !path.is_empty() && !path.ends_with('/') {
        if let Some(i) = path.rfind('/') {
            path.truncate(i + 1);
        }
    }

    if url.is_empty() || url.starts_with('?') {
        path
    } else if url.starts_with('/') {
        url.to_string()
    } else {
        path + url
    }
}

/// Mints and checks CSRF tokens bound to `(method, host, path-prefix, subject)`.
pub struct CsrfService {
    tokens: Arc<TokenService>,
    lifetime_minutes: i64,
}

impl CsrfService {
    pub fn new(tokens: Arc<TokenService>, lifetime_minutes: i64) -> Self {
        Self {
            tokens,
            lifetime_minutes,
        }
    }

    pub fn claims(method: &str, host: &str, fullpath: &str, url: &str) -> CsrfClaims {
        CsrfClaims {
            method: if method.is_empty() {
                "post".to_string()
            } else {
                method.to_lowercase()
            },
            host: host.to_string(),
            path: csrf_path(fullpath, url),
        }
    }

    pub fn token(
        &self,
        method: &str,
        host: &str,
        fullpath: &str,
        url: &str,
        subject: &str,
    ) -> Result<String, TokenError> {
        let claims = Self::claims(method, host, fullpath, url);
        self.tokens
            .issue(CSRF_TOKEN_NAME, subject, self.lifetime_minutes, claims)
    }

    /// Validate `token` for a request to `host` + `fullpath` by `subject`
    /// (empty for anonymous callers). The path check is a prefix match.
    pub fn check(
        &self,
        token: &str,
        host: &str,
        fullpath: &str,
        subject: &str,
    ) -> Result<(), CsrfError> {
        if token.is_empty() {
            return Err(CsrfError::Missing);
        }

        let parsed = self.tokens.parse::<CsrfClaims>(token, CSRF_TOKEN_NAME)?;
        let env = parsed.envelope;

        if env.sub != subject {
            return Err(CsrfError::WrongUser {
                token: env.sub,
                provided: subject.to_string(),
            });
        }

        if env.claims.host != host {
            return Err(CsrfError::WrongHost {
                token: env.claims.host,
                provided: host.to_string(),
            });
        }

        if !fullpath.starts_with(&env.claims.path) {
            let shown: String = fullpath.chars().take(env.claims.path.chars().count()).collect();
            return Err(CsrfError::WrongPath {
                token: env.claims.path,
                provided: shown,
            });
        }

        Ok(())
    }
}

/// Hidden input carrying `token`.
pub fn csrf_input(token: &str) -> String {
    format!(
        "<input type=\"hidden\" name=\"{}\" value=\"{}\" />\n",
        CSRF_TOKEN_NAME,
        attr(token)
    )
}

/// Debug companion of [`csrf_input`] exposing the claims unencoded.
pub fn csrf_debug_input(claims: &CsrfClaims) -> String {
    let json = serde_json::to_string(claims).unwrap_or_default();
    format!(
        "<input type=\"hidden\" name=\"{}debug\" value=\"{}\" />\n",
        CSRF_TOKEN_NAME,
        attr(&json)
    )
}

/// Opening `<form>` tag (always POST) with optional extra attributes.
pub fn csrf_form_open(url: &str, params: &str) -> String {
    let mut o = String::from("<form");
    if !params.is_empty() {
        o.push(' ');
        o.push_str(params);
    }
    o.push_str(" method=\"post\"");
    if !url.is_empty() {
        o.push_str(&format!(" action=\"{}\" ", attr(url)));
    }
    o.push_str(">\n");
    o
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> CsrfService {
        CsrfService::new(Arc::new(TokenService::new("csrf-secret", "portal", 5)), 60)
    }

    #[test]
    fn test_path_derivation() {
        assert_eq!(csrf_path("/group/ops/settings", ""), "/group/ops/");
        assert_eq!(csrf_path("/group/ops/", "?x=1"), "/group/ops/");
        assert_eq!(csrf_path("/group/ops/settings", "members/"), "/group/ops/members/");
        assert_eq!(csrf_path("/group/ops/settings", "/login/"), "/login/");
    }

    #[test]
    fn test_valid_for_sibling_paths() {
        let csrf = service();
        let tok = csrf.token("POST", "portal.example", "/group/ops/settings", "", "alice").unwrap();

        assert!(csrf.check(&tok, "portal.example", "/group/ops/settings", "alice").is_ok());
        assert!(csrf.check(&tok, "portal.example", "/group/ops/members/add", "alice").is_ok());
        assert!(matches!(
            csrf.check(&tok, "portal.example", "/group/dev/settings", "alice"),
            Err(CsrfError::WrongPath { .. })
        ));
    }

    #[test]
    fn test_subject_and_host_must_match() {
        let csrf = service();
        let tok = csrf.token("post", "portal.example", "/user/alice/", "", "alice").unwrap();

        assert!(matches!(
            csrf.check(&tok, "portal.example", "/user/alice/", ""),
            Err(CsrfError::WrongUser { .. })
        ));
        assert!(matches!(
            csrf.check(&tok, "evil.example", "/user/alice/", "alice"),
            Err(CsrfError::WrongHost { .. })
        ));
    }

    #[test]
    fn test_missing_and_garbage() {
        let csrf = service();
        assert_eq!(csrf.check("", "h", "/", ""), Err(CsrfError::Missing));
        assert_eq!(
            csrf.check("xx", "h", "/", ""),
            Err(CsrfError::Token(TokenError::Malformed))
        );
    }

    #[test]
    fn test_session_token_is_not_a_csrf_token() {
        let tokens = Arc::new(TokenService::new("csrf-secret", "portal", 5));
        let csrf = CsrfService::new(tokens.clone(), 60);
        let session = tokens
            .issue("websession", "alice", 20, CsrfClaims::default())
            .unwrap();
        assert_eq!(
            csrf.check(&session, "", "/", "alice"),
            Err(CsrfError::Token(TokenError::Invalid))
        );
    }

    #[test]
    fn test_form_open() {
        assert_eq!(
            csrf_form_open("/login/", "class=\"styled_form\""),
            "<form class=\"styled_form\" method=\"post\" action=\"/login/\" >\n"
        );
        assert_eq!(csrf_form_open("", ""), "<form method=\"post\">\n");
        assert!(csrf_input("abc").contains("name=\"pfCSRF\" value=\"abc\""));
    }
}
