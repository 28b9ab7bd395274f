//! Portal error taxonomy.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::auth::{AuthError, CsrfError, TokenError};
use crate::command::CmdError;
use crate::form::FormError;
use crate::net::ClientIpError;
use crate::perms::PermDenied;

/// Request-level failure classes. Handlers stage these onto the request
/// context; only the flusher turns them into HTTP output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalError {
    // Malformed form, missing parameter, bad path segment
    InvalidInput(String),

    // Permission gate failed; 404 for logged-in callers, 401 otherwise
    AuthorizationDenied { logged_in: bool, message: String },

    // Signature, expiry or envelope mismatch
    InvalidToken(String),

    NotFound(String),

    // Command dispatch or persistence failure, shown verbatim
    Upstream(String),

    // Client went away mid-response
    Transient(String),

    // Double flush, empty redirect and similar misuse
    Programmer(String),
}

impl PortalError {
    pub fn status_code(&self) -> u16 {
        match self {
            PortalError::InvalidInput(_) => 400,
            PortalError::AuthorizationDenied { logged_in: true, .. } => 404,
            PortalError::AuthorizationDenied { logged_in: false, .. } => 401,
            PortalError::InvalidToken(_) => 401,
            PortalError::NotFound(_) => 404,
            PortalError::Upstream(_) => 502,
            PortalError::Transient(_) => 499,
            PortalError::Programmer(_) => 500,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            PortalError::InvalidInput(msg) => msg,
            PortalError::AuthorizationDenied { message, .. } => message,
            PortalError::InvalidToken(msg) => msg,
            PortalError::NotFound(msg) => msg,
            PortalError::Upstream(msg) => msg,
            PortalError::Transient(msg) => msg,
            PortalError::Programmer(msg) => msg,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            PortalError::InvalidInput(_) => "INVALID_INPUT",
            PortalError::AuthorizationDenied { .. } => "AUTHORIZATION_DENIED",
            PortalError::InvalidToken(_) => "INVALID_TOKEN",
            PortalError::NotFound(_) => "NOT_FOUND",
            PortalError::Upstream(_) => "UPSTREAM_ERROR",
            PortalError::Transient(_) => "TRANSIENT",
            PortalError::Programmer(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }
}

impl PortalError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        PortalError::InvalidInput(message.into())
    }

    pub fn denied(logged_in: bool, message: impl Into<String>) -> Self {
        PortalError::AuthorizationDenied {
            logged_in,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        PortalError::NotFound(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        PortalError::Upstream(message.into())
    }

    pub fn programmer(message: impl Into<String>) -> Self {
        PortalError::Programmer(message.into())
    }
}

impl From<TokenError> for PortalError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => {
                tracing::error!("Token signing failed: {}", msg);
                PortalError::programmer("Token signing failed")
            }
            other => PortalError::InvalidToken(other.to_string()),
        }
    }
}

impl From<CsrfError> for PortalError {
    fn from(err: CsrfError) -> Self {
        PortalError::InvalidToken(err.to_string())
    }
}

impl From<ClientIpError> for PortalError {
    fn from(err: ClientIpError) -> Self {
        PortalError::InvalidInput(err.to_string())
    }
}

impl From<AuthError> for PortalError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unavailable(msg) => {
                tracing::error!("User directory error: {}", msg);
                PortalError::upstream("User directory unavailable")
            }
            other => PortalError::InvalidToken(other.to_string()),
        }
    }
}

impl From<CmdError> for PortalError {
    fn from(err: CmdError) -> Self {
        PortalError::Upstream(err.to_string())
    }
}

impl From<FormError> for PortalError {
    fn from(err: FormError) -> Self {
        PortalError::InvalidInput(err.to_string())
    }
}

impl PortalError {
    pub fn from_denied(err: PermDenied, logged_in: bool) -> Self {
        PortalError::denied(logged_in, err.0)
    }
}

impl std::fmt::Display for PortalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for PortalError {}

impl IntoResponse for PortalError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
