//! In-memory session store.
//!
//! Backs the gateway in tests and single-node deployments. All state
//! lives behind per-map mutexes, which gives the per-key atomicity the
//! limiter primitives require within one process. TTLs are enforced
//! lazily on read.

use super::{QuotaSeed, QuotaVerdict, SessionStore};
use crate::session::SessionState;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct StoredSession {
    state: SessionState,
    expires_at: Option<Instant>,
}

struct RateWindow {
    started: i64,
    count: u64,
}

struct QuotaCounter {
    remaining: i64,
    renews_at: i64,
}

/// In-memory [`SessionStore`] implementation.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, StoredSession>>,
    rate_windows: Mutex<HashMap<String, RateWindow>>,
    quotas: Mutex<HashMap<String, QuotaCounter>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) sessions. Test hook.
    pub fn session_count(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .lock()
            .values()
            .filter(|s| s.expires_at.map_or(true, |at| at > now))
            .count()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_session_detail(&self, key: &str) -> Option<SessionState> {
        let mut sessions = self.sessions.lock();
        match sessions.get(key) {
            Some(stored) => {
                if stored.expires_at.is_some_and(|at| at <= Instant::now()) {
                    sessions.remove(key);
                    None
                } else {
                    Some(stored.state.clone())
                }
            }
            None => None,
        }
    }

    async fn update_session(&self, key: &str, session: &SessionState, ttl_secs: i64) {
        let expires_at = if ttl_secs > 0 {
            Some(Instant::now() + Duration::from_secs(ttl_secs as u64))
        } else {
            None
        };
        self.sessions.lock().insert(
            key.to_string(),
            StoredSession {
                state: session.clone(),
                expires_at,
            },
        );
    }

    async fn remove_session(&self, key: &str) {
        self.sessions.lock().remove(key);
        self.rate_windows.lock().remove(key);
        self.quotas.lock().remove(key);
    }

    async fn incr_rate_window(&self, key: &str, per_secs: i64) -> u64 {
        let now = Utc::now().timestamp();
        let mut windows = self.rate_windows.lock();
        let window = windows.entry(key.to_string()).or_insert(RateWindow {
            started: now,
            count: 0,
        });
        if per_secs > 0 && now - window.started >= per_secs {
            window.started = now;
            window.count = 0;
        }
        window.count += 1;
        window.count
    }

    async fn take_quota(&self, key: &str, seed: QuotaSeed) -> QuotaVerdict {
        if seed.quota_max == -1 {
            return QuotaVerdict {
                allowed: true,
                remaining: -1,
                renews_at: seed.renews_at,
            };
        }

        let now = Utc::now().timestamp();
        let mut quotas = self.quotas.lock();
        let counter = quotas.entry(key.to_string()).or_insert(QuotaCounter {
            remaining: seed.remaining,
            renews_at: seed.renews_at,
        });

        // A renewal timestamp at or before now covers both an elapsed
        // period and a counter that was never scheduled.
        if now >= counter.renews_at {
            counter.remaining = seed.quota_max;
            counter.renews_at = now + seed.renewal_rate_secs;
        }

        if counter.remaining > 0 {
            counter.remaining -= 1;
            QuotaVerdict {
                allowed: true,
                remaining: counter.remaining,
                renews_at: counter.renews_at,
            }
        } else {
            QuotaVerdict {
                allowed: false,
                remaining: counter.remaining,
                renews_at: counter.renews_at,
            }
        }
    }
}
