//! Abstract session storage.
//!
//! The gateway treats its backing store as a TTL'd key/value store
//! plus two atomic limiter primitives. The store is the sole
//! serialization point for counters shared across processes:
//! application code never does read-then-write on a counter, it calls
//! [`SessionStore::incr_rate_window`] or [`SessionStore::take_quota`]
//! and trusts the store to be atomic per key.

pub mod memory;

use crate::session::SessionState;
use async_trait::async_trait;

pub use memory::MemorySessionStore;

/// Initial counter values handed to [`SessionStore::take_quota`] when
/// the store has no quota record for a key yet. Seeded from the
/// session so a key restored mid-period resumes where it left off.
#[derive(Debug, Clone, Copy)]
pub struct QuotaSeed {
    /// Total quota per period. `-1` disables quota enforcement.
    pub quota_max: i64,

    /// Renewal period in seconds.
    pub renewal_rate_secs: i64,

    /// Requests left according to the session.
    pub remaining: i64,

    /// Unix timestamp of the next reset according to the session.
    /// `0` schedules a fresh period starting now.
    pub renews_at: i64,
}

/// Outcome of one atomic quota decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaVerdict {
    pub allowed: bool,

    /// Requests left after this call.
    pub remaining: i64,

    /// Unix timestamp of the next reset.
    pub renews_at: i64,
}

/// TTL'd key/value store for session state and its counters.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the session stored under `key`, if present and unexpired.
    async fn get_session_detail(&self, key: &str) -> Option<SessionState>;

    /// Write `session` under `key`. `ttl_secs <= 0` means no expiry.
    async fn update_session(&self, key: &str, session: &SessionState, ttl_secs: i64);

    /// Drop the session and its counters.
    async fn remove_session(&self, key: &str);

    /// Count one request against the fixed window for `key` and return
    /// the count within the current window, including this request.
    /// Atomic per key across all users of the store.
    async fn incr_rate_window(&self, key: &str, per_secs: i64) -> u64;

    /// Atomically consume one unit of quota for `key`, resetting the
    /// counter to `quota_max` when the renewal timestamp has passed.
    async fn take_quota(&self, key: &str, seed: QuotaSeed) -> QuotaVerdict;
}
