use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

/// Upper bound of tokens remembered as revoked.
pub const REVOCATION_CACHE_MAX: usize = 512;

/// Bounded, least-recently-added list of revoked tokens. Entries carry the
/// token's own expiry and are dropped once that has passed, since an
/// expired token is rejected anyway.
#[derive(Debug)]
pub struct RevocationList {
    inner: Mutex<Inner>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct Inner {
    expiry: HashMap<[u8; 32], i64>,
    order: VecDeque<[u8; 32]>,
}

impl RevocationList {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity,
        }
    }

    fn key(token: &str) -> [u8; 32] {
        let mut key = [0u8; 32];
        key.copy_from_slice(&Sha256::digest(token.as_bytes()));
        key
    }

    pub fn revoke(&self, token: &str, expires_at: i64) {
        let key = Self::key(token);
        let mut inner = self.lock();

        if inner.expiry.insert(key, expires_at).is_none() {
            inner.order.push_back(key);
        }

        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.expiry.remove(&oldest);
            }
        }
    }

    pub fn is_revoked(&self, token: &str) -> bool {
        self.lock().expiry.contains_key(&Self::key(token))
    }

    /// Drop entries whose token expired before `now` (unix seconds).
    /// Returns how many were removed.
    pub fn expire(&self, now: i64) -> usize {
        let mut inner = self.lock();
        let before = inner.order.len();
        let Inner { expiry, order } = &mut *inner;
        order.retain(|k| match expiry.get(k) {
            Some(exp) if *exp >= now => true,
            _ => {
                expiry.remove(k);
                false
            }
        });
        before - order.len()
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Entries are plain values, a poisoned lock is still usable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for RevocationList {
    fn default() -> Self {
        Self::new(REVOCATION_CACHE_MAX)
    }
}
