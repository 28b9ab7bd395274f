use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::revocation::RevocationList;

/// Token name (audience) of browser and API sessions.
pub const SESSION_TOKEN: &str = "websession";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token does not even look like a token")]
    Malformed,

    #[error("Token not active yet")]
    NotYetValid,

    #[error("Token expired")]
    Expired,

    /// Bad signature, wrong token name, or revoked.
    #[error("Token is invalid")]
    Invalid,

    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// The signed payload: standard registered claims plus the caller's own
/// claim struct, flattened next to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<C> {
    pub aud: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    #[serde(flatten)]
    pub claims: C,
}

/// Claims for tokens that carry nothing but the envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoClaims {}

#[derive(Debug, Clone)]
pub struct ParsedToken<C> {
    /// The remaining lifetime is inside the refresh window.
    pub near_expiry: bool,
    pub envelope: Envelope<C>,
}

/// Issues and verifies HS256 tokens with a process-wide secret.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    refresh_minutes: i64,
    revoked: Arc<RevocationList>,
}

impl TokenService {
    pub fn new(secret: &str, issuer: &str, refresh_minutes: i64) -> Self {
        let secret = if secret.is_empty() {
            tracing::warn!("No token secret configured, using a random one; sessions will not survive a restart");
            format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
        } else {
            secret.to_string()
        };

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
            refresh_minutes,
            revoked: Arc::new(RevocationList::default()),
        }
    }

    pub fn revocations(&self) -> &Arc<RevocationList> {
        &self.revoked
    }

    /// Sign a `name` token for `subject`, valid for `minutes`.
    pub fn issue<C: Serialize>(
        &self,
        name: &str,
        subject: &str,
        minutes: i64,
        claims: C,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let envelope = Envelope {
            aud: name.to_string(),
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(minutes)).timestamp(),
            iss: self.issuer.clone(),
            claims,
        };

        encode(&Header::new(Algorithm::HS256), &envelope, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature, expiry, token name and revocation.
    pub fn parse<C: DeserializeOwned>(
        &self,
        token: &str,
        name: &str,
    ) -> Result<ParsedToken<C>, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(&[name]);
        validation.set_required_spec_claims(&["exp", "aud", "sub"]);

        let data = decode::<Envelope<C>>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => TokenError::Malformed,
                ErrorKind::ImmatureSignature => TokenError::NotYetValid,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;

        if self.revoked.is_revoked(token) {
            return Err(TokenError::Invalid);
        }

        let refresh_at = (Utc::now() + Duration::minutes(self.refresh_minutes)).timestamp();

        Ok(ParsedToken {
            near_expiry: refresh_at > data.claims.exp,
            envelope: data.claims,
        })
    }

    /// Remember `token` as revoked until it would have expired.
    pub fn revoke(&self, token: &str) {
        let exp = self
            .peek_expiry(token)
            .unwrap_or_else(|| (Utc::now() + Duration::days(1)).timestamp());
        self.revoked.revoke(token, exp);
    }

    fn peek_expiry(&self, token: &str) -> Option<i64> {
        #[derive(Deserialize)]
        struct Exp {
            exp: i64,
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<Exp>(token, &self.decoding, &validation)
            .ok()
            .map(|d| d.claims.exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
    struct Demo {
        role: String,
    }

    fn service() -> TokenService {
        TokenService::new("test-secret", "portal", 5)
    }

    #[test]
    fn test_issue_and_parse() {
        let tokens = service();
        let tok = tokens
            .issue("websession", "alice", 20, Demo { role: "admin".to_string() })
            .unwrap();

        let parsed: ParsedToken<Demo> = tokens.parse(&tok, "websession").unwrap();
        assert_eq!(parsed.envelope.sub, "alice");
        assert_eq!(parsed.envelope.aud, "websession");
        assert_eq!(parsed.envelope.iss, "portal");
        assert_eq!(parsed.envelope.claims.role, "admin");
        assert!(!parsed.near_expiry);
    }

    #[test]
    fn test_near_expiry() {
        let tokens = service();
        let tok = tokens.issue("websession", "alice", 3, NoClaims {}).unwrap();
        let parsed: ParsedToken<NoClaims> = tokens.parse(&tok, "websession").unwrap();
        assert!(parsed.near_expiry);
    }

    #[test]
    fn test_expired() {
        let tokens = service();
        let tok = tokens.issue("websession", "alice", -1, NoClaims {}).unwrap();
        let err = tokens.parse::<NoClaims>(&tok, "websession").unwrap_err();
        assert_eq!(err, TokenError::Expired);
        assert_eq!(err.to_string(), "Token expired");
    }

    #[test]
    fn test_wrong_name_and_garbage() {
        let tokens = service();
        let tok = tokens.issue("pfCSRF", "alice", 20, NoClaims {}).unwrap();
        assert_eq!(
            tokens.parse::<NoClaims>(&tok, "websession").unwrap_err(),
            TokenError::Invalid
        );
        assert_eq!(
            tokens.parse::<NoClaims>("not a token", "websession").unwrap_err(),
            TokenError::Malformed
        );
    }

    #[test]
    fn test_wrong_secret() {
        let tok = service().issue("websession", "alice", 20, NoClaims {}).unwrap();
        let other = TokenService::new("other-secret", "portal", 5);
        assert_eq!(
            other.parse::<NoClaims>(&tok, "websession").unwrap_err(),
            TokenError::Invalid
        );
    }

    #[test]
    fn test_revoked_token_is_invalid() {
        let tokens = service();
        let tok = tokens.issue("websession", "alice", 20, NoClaims {}).unwrap();
        tokens.revoke(&tok);
        assert_eq!(
            tokens.parse::<NoClaims>(&tok, "websession").unwrap_err(),
            TokenError::Invalid
        );
        assert_eq!(tokens.revocations().len(), 1);
    }
}
