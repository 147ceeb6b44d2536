//! Per-key usage monitor.
//!
//! After an allowed forward, checks how much of the key's quota has
//! been consumed and fires a trigger event when usage crosses one of
//! the configured percentage thresholds. Fire-and-forget: the
//! response never waits on a monitor check.

use crate::config::MonitorConfig;
use crate::events::{EventDispatcher, EventKind, EventMeta};
use crate::session::SessionState;

/// Evaluates quota-usage triggers for sessions.
#[derive(Clone)]
pub struct Monitor {
    config: MonitorConfig,
    events: EventDispatcher,
}

impl Monitor {
    pub fn new(config: MonitorConfig, events: EventDispatcher) -> Self {
        Self { config, events }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Check `session` against the configured thresholds and fire a
    /// trigger event for the highest one crossed.
    pub fn check(&self, session: &SessionState, key: &str) {
        if !self.config.enabled {
            return;
        }
        let Some(usage) = quota_usage_percent(session) else {
            return;
        };

        let crossed = self
            .config
            .trigger_limits
            .iter()
            .copied()
            .filter(|limit| usage >= *limit)
            .fold(None, |acc: Option<f64>, limit| {
                Some(acc.map_or(limit, |a| a.max(limit)))
            });

        if let Some(limit) = crossed {
            tracing::info!(
                target: "portcullis.monitor",
                key = %key,
                usage = usage,
                threshold = limit,
                "Quota usage trigger crossed"
            );
            self.events.fire(
                EventKind::TriggerExceeded,
                EventMeta {
                    message: format!("Quota usage at {usage:.0}%"),
                    path: String::new(),
                    origin: String::new(),
                    key: key.to_string(),
                    originating_request: String::new(),
                },
            );
        }
    }
}

/// Percentage of quota consumed, or `None` when the session has no
/// enforceable quota.
fn quota_usage_percent(session: &SessionState) -> Option<f64> {
    if session.quota_max <= 0 {
        return None;
    }
    let consumed = session.quota_max - session.quota_remaining;
    Some(consumed as f64 / session.quota_max as f64 * 100.0)
}
