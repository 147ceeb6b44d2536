//! Gateway configuration.
//!
//! Process-level settings are loaded from environment variables with
//! sensible defaults; the per-API definition is a JSON document loaded
//! from disk at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::Path;
use thiserror::Error;

/// Default TTL for the in-process session cache, in seconds.
pub const DEFAULT_LOCAL_CACHE_TTL_SECS: u64 = 10;

/// Default TTL for cached JWKS documents, in seconds.
pub const DEFAULT_JWKS_CACHE_TTL_SECS: u64 = 240;

/// Default timeout for JWKS endpoint fetches, in seconds.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_SECS: u64 = 10;

/// Default credential header.
pub const DEFAULT_AUTH_HEADER_NAME: &str = "Authorization";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to read API definition {0}: {1}")]
    ApiSpecRead(String, String),

    #[error("Failed to parse API definition {0}: {1}")]
    ApiSpecParse(String, String),
}

/// Process-level gateway configuration.
///
/// Loaded from environment variables. `from_vars` exists so tests can
/// construct configurations without touching the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Path to the API definition JSON document.
    pub api_spec_path: String,

    /// Path to the policies JSON document.
    pub policies_path: String,

    /// Persist session counters on a background task instead of inline.
    /// Trades strict read-after-write for latency; counters may be
    /// visible only after a short delay.
    pub use_async_session_write: bool,

    /// Disable the in-process session cache entirely.
    pub disable_local_session_cache: bool,

    /// TTL for the in-process session cache, in seconds.
    pub local_cache_ttl_secs: u64,

    /// TTL for cached JWKS documents, in seconds.
    pub jwks_cache_ttl_secs: u64,

    /// Timeout for JWKS endpoint fetches, in seconds.
    pub jwks_fetch_timeout_secs: u64,

    /// Per-key usage monitor settings.
    pub monitor: MonitorConfig,
}

/// Per-key usage monitor settings.
///
/// When enabled, quota usage is checked after each allowed forward and
/// a trigger event fires when usage crosses one of the configured
/// percentage thresholds.
#[derive(Debug, Clone, Default)]
pub struct MonitorConfig {
    pub enabled: bool,

    /// Usage thresholds as percentages, e.g. `[80.0, 95.0]`.
    pub trigger_limits: Vec<f64>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a map (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("PORTCULLIS_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let api_spec_path = vars
            .get("PORTCULLIS_API_SPEC")
            .ok_or_else(|| ConfigError::MissingEnvVar("PORTCULLIS_API_SPEC".to_string()))?
            .clone();

        let policies_path = vars
            .get("PORTCULLIS_POLICIES")
            .cloned()
            .unwrap_or_else(|| "policies.json".to_string());

        let use_async_session_write = parse_bool(vars, "PORTCULLIS_ASYNC_SESSION_WRITE")?;
        let disable_local_session_cache = parse_bool(vars, "PORTCULLIS_DISABLE_SESSION_CACHE")?;

        let local_cache_ttl_secs = parse_positive_u64(
            vars,
            "PORTCULLIS_SESSION_CACHE_TTL_SECS",
            DEFAULT_LOCAL_CACHE_TTL_SECS,
        )?;
        let jwks_cache_ttl_secs = parse_positive_u64(
            vars,
            "PORTCULLIS_JWKS_CACHE_TTL_SECS",
            DEFAULT_JWKS_CACHE_TTL_SECS,
        )?;
        let jwks_fetch_timeout_secs = parse_positive_u64(
            vars,
            "PORTCULLIS_JWKS_FETCH_TIMEOUT_SECS",
            DEFAULT_JWKS_FETCH_TIMEOUT_SECS,
        )?;

        let monitor_enabled = parse_bool(vars, "PORTCULLIS_MONITOR_ENABLED")?;
        let trigger_limits = match vars.get("PORTCULLIS_MONITOR_TRIGGERS") {
            Some(raw) => parse_trigger_limits(raw)?,
            None => Vec::new(),
        };

        Ok(Config {
            bind_address,
            api_spec_path,
            policies_path,
            use_async_session_write,
            disable_local_session_cache,
            local_cache_ttl_secs,
            jwks_cache_ttl_secs,
            jwks_fetch_timeout_secs,
            monitor: MonitorConfig {
                enabled: monitor_enabled,
                trigger_limits,
            },
        })
    }
}

fn parse_bool(vars: &HashMap<String, String>, name: &str) -> Result<bool, ConfigError> {
    match vars.get(name).map(String::as_str) {
        None | Some("") => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("expected true/false, got '{other}'"),
        )),
    }
}

fn parse_positive_u64(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(raw) = vars.get(name) else {
        return Ok(default);
    };
    let value: u64 = raw.parse().map_err(|e| {
        ConfigError::InvalidValue(name.to_string(), format!("not a valid integer: {e}"))
    })?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "must be greater than 0".to_string(),
        ));
    }
    Ok(value)
}

fn parse_trigger_limits(raw: &str) -> Result<Vec<f64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>().map_err(|e| {
                ConfigError::InvalidValue(
                    "PORTCULLIS_MONITOR_TRIGGERS".to_string(),
                    format!("'{s}' is not a number: {e}"),
                )
            })
        })
        .collect()
}

/// Credential-source settings for one API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Header carrying the credential. Also names the query/form
    /// parameter and the cookie when those sources are enabled.
    pub auth_header_name: String,

    /// Also look for the credential in a URL/form parameter.
    pub use_param: bool,

    /// Also look for the credential in a cookie.
    pub use_cookie: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auth_header_name: DEFAULT_AUTH_HEADER_NAME.to_string(),
            use_param: false,
            use_cookie: false,
        }
    }
}

/// One API definition: identity, ownership, credential sources, and
/// JWT verification settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSpec {
    pub api_id: String,
    pub name: String,
    pub org_id: String,

    pub auth: AuthConfig,

    /// Declared signing family: "hmac", "rsa", or "ecdsa".
    pub jwt_signing_method: String,

    /// JWKS endpoint URL, an inline base64 key, or empty for per-key
    /// session secrets.
    pub jwt_source: String,

    /// Claim naming the caller identity in central-authority mode.
    pub jwt_identity_base_field: String,

    /// Claim naming the policy to apply in central-authority mode.
    pub jwt_policy_field_name: String,

    /// TTL applied to sessions written for this API, in seconds.
    pub session_lifetime: i64,
}

impl ApiSpec {
    /// Load an API definition from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ApiSpecRead(path.display().to_string(), e.to_string()))?;
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ApiSpecParse(path.display().to_string(), e.to_string()))
    }

    /// True when this API delegates authority to a central JWT issuer.
    pub fn is_central_authority(&self) -> bool {
        !self.jwt_source.is_empty()
    }
}
