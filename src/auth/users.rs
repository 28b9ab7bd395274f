use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No such user")]
    NoSuchUser,

    #[error("Login incorrect")]
    Incorrect,

    #[error("User directory unavailable: {0}")]
    Unavailable(String),
}

/// What the request core needs to know about an account.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub full_name: String,
    /// Allowed to switch into system-administrator mode.
    pub can_be_sysadmin: bool,
}

/// Account lookup and credential checks. The persistence behind it is not
/// part of this crate.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn check_auth(
        &self,
        username: &str,
        password: &str,
        twofactor: &str,
    ) -> Result<UserRecord, AuthError>;

    /// Re-read an account named by a session token.
    async fn refresh(&self, username: &str) -> Result<UserRecord, AuthError>;
}

/// In-memory directory keyed by username with salted SHA-256 password
/// digests. Used by the server binary (from `PORTAL_USERS`) and by tests.
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: HashMap<String, (String, UserRecord)>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, username: &str, password: &str, full_name: &str, can_be_sysadmin: bool) -> Self {
        let record = UserRecord {
            username: username.to_string(),
            full_name: full_name.to_string(),
            can_be_sysadmin,
        };
        self.users
            .insert(username.to_string(), (Self::digest(username, password), record));
        self
    }

    /// Parse `name:password[:admin],...`.
    pub fn from_spec(spec: &str) -> Self {
        spec.split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .fold(Self::new(), |dir, entry| {
                let mut parts = entry.splitn(3, ':');
                let name = parts.next().unwrap_or_default();
                let password = parts.next().unwrap_or_default();
                let admin = parts.next() == Some("admin");
                if name.is_empty() || password.is_empty() {
                    tracing::warn!("Ignoring malformed user entry {:?}", name);
                    return dir;
                }
                dir.with_user(name, password, name, admin)
            })
    }

    fn digest(username: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(username.as_bytes());
        hasher.update(b":");
        hasher.update(password.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn check_auth(
        &self,
        username: &str,
        password: &str,
        _twofactor: &str,
    ) -> Result<UserRecord, AuthError> {
        let (digest, record) = self.users.get(username).ok_or(AuthError::Incorrect)?;
        if *digest != Self::digest(username, password) {
            return Err(AuthError::Incorrect);
        }
        Ok(record.clone())
    }

    async fn refresh(&self, username: &str) -> Result<UserRecord, AuthError> {
        self.users
            .get(username)
            .map(|(_, r)| r.clone())
            .ok_or(AuthError::NoSuchUser)
    }
}
