//! In-process session cache.
//!
//! Absorbs repeated lookups for the same key within a few seconds.
//! Entries are by-value snapshots; the session store stays
//! authoritative for counters, so stale reads inside the TTL are
//! acceptable.

use crate::session::SessionState;
use moka::future::Cache;
use std::time::Duration;

const MAX_CACHED_SESSIONS: u64 = 100_000;

/// Short-TTL cache of resolved sessions, keyed by session key.
///
/// Constructed once at startup and shared across request handlers.
/// When disabled, every call is a no-op/miss.
pub struct LocalSessionCache {
    cache: Option<Cache<String, SessionState>>,
}

impl LocalSessionCache {
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        let cache = enabled.then(|| {
            Cache::builder()
                .max_capacity(MAX_CACHED_SESSIONS)
                .time_to_live(ttl)
                .build()
        });
        Self { cache }
    }

    pub fn enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub async fn get(&self, key: &str) -> Option<SessionState> {
        match &self.cache {
            Some(cache) => cache.get(key).await,
            None => None,
        }
    }

    pub async fn set(&self, key: String, session: SessionState) {
        if let Some(cache) = &self.cache {
            cache.insert(key, session).await;
        }
    }

    pub async fn remove(&self, key: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate(key).await;
        }
    }
}
