//! Shared test fixtures for Portcullis.
//!
//! Token builders for the signing families the gateway verifies, plus
//! JWKS documents backed by freshly generated certificates. Everything
//! here is deterministic enough for assertions but generates real key
//! material, so signatures actually verify.

#![allow(clippy::unwrap_used, clippy::expect_used)]

pub mod token;

pub use token::{hs256_token, hs256_token_with_kid, Es256KeyPair};

/// Unix timestamp `secs` seconds from now, for `exp`/`iat` claims.
pub fn unix_time_from_now(secs: i64) -> i64 {
    chrono::Utc::now().timestamp() + secs
}
