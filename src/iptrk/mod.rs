//! IP reputation tracking.
//!
//! Failed CSRF checks and failed logins each count a hit against the
//! client address. Addresses over the limit are reported as blocked; idle
//! entries expire.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IptrkEntry {
    pub ip: IpAddr,
    pub count: u32,
    pub blocked: bool,
    pub entered: DateTime<Utc>,
    pub last: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Hits {
    count: u32,
    entered: DateTime<Utc>,
    last: DateTime<Utc>,
}

#[derive(Debug)]
pub struct IpTracker {
    entries: Arc<RwLock<HashMap<IpAddr, Hits>>>,
    max: u32,
}

impl IpTracker {
    pub fn new(max: u32) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max,
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Record a hit for `ip`; returns whether it is now over the limit.
    pub async fn count(&self, ip: IpAddr) -> bool {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let hits = entries.entry(ip).or_insert(Hits {
            count: 0,
            entered: now,
            last: now,
        });
        hits.count += 1;
        hits.last = now;

        let limited = hits.count > self.max;
        if limited {
            info!("IPtrk: {} is over the limit ({} hits)", ip, hits.count);
        }
        limited
    }

    /// Current hit count for `ip` (0 when untracked).
    pub async fn hits(&self, ip: &IpAddr) -> u32 {
        self.entries.read().await.get(ip).map(|h| h.count).unwrap_or(0)
    }

    pub async fn is_blocked(&self, ip: &IpAddr) -> bool {
        self.hits(ip).await > self.max
    }

    /// Forget `ip`; returns whether it was tracked.
    pub async fn reset(&self, ip: &IpAddr) -> bool {
        self.entries.write().await.remove(ip).is_some()
    }

    pub async fn flush(&self) {
        self.entries.write().await.clear();
    }

    /// All entries ordered by address.
    pub async fn list(&self) -> Vec<IptrkEntry> {
        let entries = self.entries.read().await;
        let mut list: Vec<IptrkEntry> = entries
            .iter()
            .map(|(ip, h)| IptrkEntry {
                ip: *ip,
                count: h.count,
                blocked: h.count > self.max,
                entered: h.entered,
                last: h.last,
            })
            .collect();
        list.sort_by(|a, b| a.ip.cmp(&b.ip));
        list
    }

    /// Drop entries whose last hit is before `cutoff`.
    pub async fn expire(&self, cutoff: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, h| h.last >= cutoff);
        before - entries.len()
    }

    /// Periodically expire entries idle for longer than `idle`.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration, idle: chrono::Duration) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.tick().await;
            loop {
                tick.tick().await;
                let removed = tracker.expire(Utc::now() - idle).await;
                if removed > 0 {
                    debug!("IPtrk: expired {} entries", removed);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_count_until_limited() {
        let tracker = IpTracker::new(2);
        assert!(!tracker.count(ip("192.0.2.1")).await);
        assert!(!tracker.count(ip("192.0.2.1")).await);
        assert!(tracker.count(ip("192.0.2.1")).await);
        assert_eq!(tracker.hits(&ip("192.0.2.1")).await, 3);
        assert!(tracker.is_blocked(&ip("192.0.2.1")).await);
        assert!(!tracker.is_blocked(&ip("192.0.2.2")).await);
    }

    #[tokio::test]
    async fn test_list_and_reset() {
        let tracker = IpTracker::new(1);
        tracker.count(ip("198.51.100.2")).await;
        tracker.count(ip("198.51.100.1")).await;
        tracker.count(ip("198.51.100.1")).await;

        let list = tracker.list().await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].ip, ip("198.51.100.1"));
        assert!(list[0].blocked);
        assert!(!list[1].blocked);

        assert!(tracker.reset(&ip("198.51.100.1")).await);
        assert!(!tracker.reset(&ip("198.51.100.1")).await);
        tracker.flush().await;
        assert!(tracker.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_expire() {
        let tracker = IpTracker::new(5);
        tracker.count(ip("203.0.113.4")).await;
        assert_eq!(tracker.expire(Utc::now() - chrono::Duration::minutes(5)).await, 0);
        assert_eq!(tracker.expire(Utc::now() + chrono::Duration::seconds(1)).await, 1);
    }
}
