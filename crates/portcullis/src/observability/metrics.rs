//! Health metric definitions.
//!
//! Prometheus naming: `portcullis_` prefix, `_total` suffix for
//! counters, `_seconds` for duration histograms. The only label is
//! `api_id`, whose cardinality is bounded by configuration.

use metrics::{counter, histogram};
use std::time::Duration;

/// A credential failed extraction, verification, or resolution.
///
/// Metric: `portcullis_auth_key_failures_total`
pub fn record_key_failure(api_id: &str) {
    counter!("portcullis_auth_key_failures_total",
        "api_id" => api_id.to_string()
    )
    .increment(1);
}

/// A request was refused for exceeding its rate limit.
///
/// Metric: `portcullis_throttles_total`
pub fn record_throttle(api_id: &str) {
    counter!("portcullis_throttles_total",
        "api_id" => api_id.to_string()
    )
    .increment(1);
}

/// A request was refused for exceeding its quota.
///
/// Metric: `portcullis_quota_violations_total`
pub fn record_quota_violation(api_id: &str) {
    counter!("portcullis_quota_violations_total",
        "api_id" => api_id.to_string()
    )
    .increment(1);
}

/// Record one completed request with its total chain latency.
///
/// Metrics: `portcullis_requests_total`,
/// `portcullis_request_duration_seconds`
pub fn record_request(api_id: &str, status_code: u16, duration: Duration) {
    histogram!("portcullis_request_duration_seconds",
        "api_id" => api_id.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("portcullis_requests_total",
        "api_id" => api_id.to_string(),
        "status_code" => status_code.to_string()
    )
    .increment(1);
}
