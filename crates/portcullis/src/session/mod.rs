//! Session state and the machinery that resolves and limits it.

pub mod cache;
pub mod limiter;
pub mod monitor;
pub mod resolver;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Suffix joining a base session key to an API ID. The naming
/// convention `base + ".API-" + api_id` is part of the external
/// contract: per-API counters live under that exact key.
pub const API_SESSION_KEY_SUFFIX: &str = ".API-";

/// Builds the key under which a per-API sub-session is stored.
pub fn per_api_session_key(base_key: &str, api_id: &str) -> String {
    format!("{base_key}{API_SESSION_KEY_SUFFIX}{api_id}")
}

/// One permitted URL within an API's access rights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessSpec {
    pub url: String,
    pub methods: Vec<String>,
}

/// Access rights for one API: which versions and paths a session may
/// call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessDefinition {
    pub api_name: String,
    pub api_id: String,
    pub versions: Vec<String>,
    pub allowed_urls: Vec<AccessSpec>,
}

/// Shared-secret material carried by a session for per-key JWT
/// verification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtData {
    pub secret: String,
}

/// The mutable state of one authenticated caller.
///
/// Created on first sight of a valid credential, stored with
/// TTL = `session_lifetime`, counters updated on every request.
/// Overlayed policy fields are copied by value; a session never holds
/// a reference into the policy registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    /// Legacy mirror of `rate`, kept consistent for output parity.
    pub allowance: f64,

    /// Requests allowed per `per` seconds. `0` disables rate limiting.
    pub rate: f64,

    /// Window length for `rate`, in seconds.
    pub per: f64,

    /// Total quota per renewal period. `-1` disables quota.
    pub quota_max: i64,

    /// Requests left in the current quota period.
    pub quota_remaining: i64,

    /// Quota renewal period, in seconds.
    pub quota_renewal_rate: i64,

    /// Unix timestamp at which the quota resets.
    pub quota_renews: i64,

    /// Unix timestamp at which the key itself expires. `0` = never.
    pub expires: i64,

    /// API-ID -> policy-ID overrides; presence triggers per-API
    /// sub-session materialization.
    pub policy_per_api: HashMap<String, String>,

    pub access_rights: HashMap<String, AccessDefinition>,

    pub hmac_enabled: bool,

    pub is_inactive: bool,

    pub tags: Vec<String>,

    /// Transient overlay hint: a policy to copy onto this session the
    /// next time it is validated.
    pub apply_policy_id: String,

    pub oauth_client_id: String,

    pub jwt_data: JwtData,

    /// Store TTL applied when this session is written, in seconds.
    pub session_lifetime: i64,
}
