//! Session token lifecycle on the request.

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderValue};
use tracing::{debug, error};

use super::RequestContext;
use crate::auth::{AuthError, SessionClaims, UserRecord, SESSION_TOKEN};
use crate::error::PortalError;
use crate::perms::SelectedUser;

#[derive(Debug, Clone, Default)]
pub(super) struct TokenState {
    /// Token the client sent, empty when none.
    pub received: String,
    /// Token that is valid for the user after this request.
    pub current: String,
    pub near_expiry: bool,
    pub bearer_auth: bool,
}

impl RequestContext {
    /// Pick up a session token from `Authorization: Bearer`, the session
    /// cookie or the `access_token` argument, first non-empty wins.
    pub async fn init_token(&mut self) {
        self.token.bearer_auth = false;

        let mut tok = String::new();
        let ah = self.header("authorization").to_string();
        if ah.len() > 6 && ah.get(..6).map(|p| p.eq_ignore_ascii_case("bearer")).unwrap_or(false) {
            self.token.bearer_auth = true;
            tok = ah.get(7..).unwrap_or_default().trim().to_string();
        }

        if tok.is_empty() {
            tok = self.portal.cookie.extract(&self.headers).unwrap_or_default();
        }

        if tok.is_empty() {
            tok = self.get_arg("access_token");
        }

        self.token.received = tok.clone();
        if tok.is_empty() {
            return;
        }

        match self.login_token(&tok).await {
            Err(e) => debug!("LoginToken failed: {}", e),
            Ok(near_expiry) => {
                self.token.near_expiry = near_expiry;
                if self.get_arg("xtra") == "swapadmin" {
                    self.swap_sysadmin();
                }
            }
        }
    }

    /// Install the user named by a session token. Returns whether the
    /// token should be refreshed.
    pub async fn login_token(&mut self, tok: &str) -> Result<bool, PortalError> {
        self.token.current.clear();

        let parsed = self.portal.tokens.parse::<SessionClaims>(tok, SESSION_TOKEN)?;
        let subject = parsed.envelope.sub;

        let users = Arc::clone(&self.portal.users);
        let user = users.refresh(&subject).await.map_err(|e| {
            debug!("Fetch of user {:?} failed: {}", subject, e);
            PortalError::from(e)
        })?;

        let sysadmin = parsed.envelope.claims.issysadmin && user.can_be_sysadmin;
        self.become_user(user, sysadmin);
        self.token.current = tok.to_string();

        Ok(parsed.near_expiry)
    }

    /// Check credentials and become the user. Every attempt counts against
    /// the client IP; a blocked IP cannot log in at all.
    pub async fn login(&mut self, username: &str, password: &str, twofactor: &str) -> Result<(), AuthError> {
        let ip = self.client.ip;
        if self.portal.iptrk.count(ip).await {
            error!("CheckAuth({}): Too many login attempts from IP: {}", username, ip);
            return Err(AuthError::Incorrect);
        }

        let users = Arc::clone(&self.portal.users);
        match users.check_auth(username, password, twofactor).await {
            Ok(user) => {
                // Force a fresh token at flush
                self.token.current.clear();
                self.become_user(user, false);
                Ok(())
            }
            Err(e) => {
                error!("CheckAuth({}): {}", username, e);
                Err(AuthError::Incorrect)
            }
        }
    }

    pub fn logout(&mut self) {
        if !self.token.current.is_empty() {
            self.portal.tokens.revoke(&self.token.current);
        }

        self.user = None;
        self.sysadmin = false;
        self.selected_user = None;
        self.token.current.clear();
        self.token.near_expiry = false;
    }

    /// Make `user` the authenticated user of this request and select them.
    pub fn become_user(&mut self, user: UserRecord, sysadmin: bool) {
        self.selected_user = Some(SelectedUser {
            username: user.username.clone(),
            shares_group: true,
        });
        self.sysadmin = sysadmin && user.can_be_sysadmin;
        self.user = Some(user);
    }

    /// Toggle between regular and sysadmin mode. Fails for users that may
    /// not be a sysadmin.
    pub fn swap_sysadmin(&mut self) -> bool {
        let Some(user) = &self.user else {
            return false;
        };
        if !user.can_be_sysadmin {
            return false;
        }

        self.sysadmin = !self.sysadmin;
        self.token.current.clear();
        true
    }

    pub fn token(&self) -> &str {
        &self.token.current
    }

    pub fn bearer_auth(&self) -> bool {
        self.token.bearer_auth
    }

    /// Force bearer semantics for the response, used by the API endpoint.
    pub fn set_bearer_auth(&mut self) {
        self.token.bearer_auth = true;
    }

    pub fn new_token(&mut self) -> Result<(), PortalError> {
        let Some(user) = &self.user else {
            return Err(PortalError::denied(false, "Not authenticated"));
        };

        let claims = SessionClaims {
            userdesc: user.full_name.clone(),
            issysadmin: self.sysadmin,
        };
        let minutes = self.portal.config.security.token_expiry_minutes;

        match self.portal.tokens.issue(SESSION_TOKEN, &user.username, minutes, claims) {
            Ok(tok) => {
                self.token.current = tok;
                self.token.near_expiry = false;
                Ok(())
            }
            Err(e) => {
                self.token.current.clear();
                Err(e.into())
            }
        }
    }

    /// Emit the session token (or its invalidation) into `headers`.
    pub(super) fn emit_token(&mut self, headers: &mut HeaderMap) {
        let realm = self.portal.config.server.system_name.clone();

        if self.is_logged_in() {
            if self.token.current.is_empty() || self.token.near_expiry {
                debug!("Generating new token for logged in user");
                if let Err(e) = self.new_token() {
                    error!("setToken - No Token: {}", e);
                    return;
                }
            }

            if self.token.current == self.token.received {
                return;
            }

            debug!("Got a different token than received, sending it to the client");
            if self.token.bearer_auth {
                let challenge = format!("Bearer realm=\"{}\" access_token=\"{}\"", realm, self.token.current);
                put_header(headers, header::WWW_AUTHENTICATE, &challenge, false);
            } else {
                let cookie = self.portal.cookie.build_set_cookie(&self.token.current);
                put_header(headers, header::SET_COOKIE, &cookie, true);
            }
        } else if !self.token.current.is_empty() || !self.token.received.is_empty() {
            debug!("Not logged in, revoking token");
            if self.token.bearer_auth {
                put_header(headers, header::WWW_AUTHENTICATE, &format!("Bearer realm=\"{}\"", realm), false);
            } else {
                let cookie = self.portal.cookie.build_invalidate_cookie();
                put_header(headers, header::SET_COOKIE, &cookie, true);
            }
        }
    }
}

/// Set (or append) a header, logging values that are not valid header text.
pub(super) fn put_header(headers: &mut HeaderMap, name: header::HeaderName, value: &str, append: bool) {
    match HeaderValue::from_str(value) {
        Ok(v) if append => {
            headers.append(name, v);
        }
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(_) => error!("Invalid value for header {}: {:?}", name, value),
    }
}
