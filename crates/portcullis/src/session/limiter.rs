//! Rate and quota enforcement against the session store.
//!
//! The limiter owns no state of its own: both counters live in the
//! store, which provides the per-key atomicity. Rate is checked before
//! quota, so a request refused for rate does not consume quota and a
//! request failing both reports rate.

use crate::session::SessionState;
use crate::storage::{QuotaSeed, SessionStore};

/// Why a forward was (or was not) allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitReason {
    Allowed,
    RateLimited,
    QuotaExceeded,
    /// The session is inactive or otherwise unfit to forward.
    Denied,
}

/// Stateless limiter shared by all requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionLimiter;

impl SessionLimiter {
    /// Decide whether one request keyed by `key` may be forwarded,
    /// updating the session's quota counters from the store's verdict.
    pub async fn forward_message(
        &self,
        session: &mut SessionState,
        key: &str,
        store: &dyn SessionStore,
    ) -> LimitReason {
        if session.is_inactive {
            return LimitReason::Denied;
        }

        if session.rate > 0.0 {
            let count = store.incr_rate_window(key, session.per as i64).await;
            if count as f64 > session.rate {
                return LimitReason::RateLimited;
            }
        }

        if session.quota_max != -1 {
            let verdict = store
                .take_quota(
                    key,
                    QuotaSeed {
                        quota_max: session.quota_max,
                        renewal_rate_secs: session.quota_renewal_rate,
                        remaining: session.quota_remaining,
                        renews_at: session.quota_renews,
                    },
                )
                .await;

            session.quota_remaining = verdict.remaining;
            session.quota_renews = verdict.renews_at;

            if !verdict.allowed {
                return LimitReason::QuotaExceeded;
            }
        }

        LimitReason::Allowed
    }
}
