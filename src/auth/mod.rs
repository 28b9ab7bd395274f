pub mod cookie;
pub mod csrf;
pub mod revocation;
pub mod token;
pub mod users;

use serde::{Deserialize, Serialize};

pub use cookie::SessionCookie;
pub use csrf::{CsrfClaims, CsrfError, CsrfService, CSRF_HEADER, CSRF_TOKEN_NAME};
pub use revocation::RevocationList;
pub use token::{Envelope, NoClaims, ParsedToken, TokenError, TokenService, SESSION_TOKEN};
pub use users::{AuthError, StaticUserDirectory, UserDirectory, UserRecord};

/// Claims of a `websession` token.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub userdesc: String,
    pub issysadmin: bool,
}

/// Token name of the short-lived OAuth2 authorization grant.
pub const OAUTH_AUTH_TOKEN: &str = "oauth_auth";

/// Token name of OAuth2 access tokens.
pub const OAUTH_ACCESS_TOKEN: &str = "oauth_access";

/// Claims of an `oauth_auth` grant, replayed when the code is exchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthGrantClaims {
    pub oa_client_id: String,
    pub oa_scope: String,
    pub oa_rtype: String,
    pub oa_redirect: String,
}
