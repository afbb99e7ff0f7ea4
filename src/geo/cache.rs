//! Time-boxed cache for external lookup results
//!
//! Entries expire lazily: a read older than the TTL is treated as absent
//! and the caller refreshes it. An explicit [`GeoCache::sweep`] purges
//! expired entries; [`GeoCache::stats`] reports counts without evicting.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CacheEntry {
    country_code: String,
    organization: String,
    resolved_at: Instant,
}

/// Cache statistics: total entries vs entries past their TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    pub expired: usize,
}

/// TTL cache keyed by textual IP address.
pub struct GeoCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl GeoCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cached (country code, organization) for an address, if fresh.
    pub async fn get(&self, address: &str) -> Option<(String, String)> {
        let entries = self.entries.read().await;
        let entry = entries.get(address)?;

        // older than the TTL means absent, refresh before reuse
        if entry.resolved_at.elapsed() > self.ttl {
            return None;
        }

        Some((entry.country_code.clone(), entry.organization.clone()))
    }

    /// Store a freshly resolved result.
    pub async fn insert(&self, address: String, country_code: String, organization: String) {
        let mut entries = self.entries.write().await;
        entries.insert(
            address,
            CacheEntry {
                country_code,
                organization,
                resolved_at: Instant::now(),
            },
        );
    }

    /// Purge every expired entry. Returns the number removed.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.resolved_at.elapsed() <= self.ttl);
        before - entries.len()
    }

    /// Total vs expired counts, without evicting anything.
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let expired = entries
            .values()
            .filter(|entry| entry.resolved_at.elapsed() > self.ttl)
            .count();
        CacheStats {
            total: entries.len(),
            expired,
        }
    }
}
