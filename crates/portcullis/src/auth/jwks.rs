//! JWKS fetching and per-API caching.
//!
//! Each API binds to exactly one JWKS endpoint, so the cache is keyed
//! by API ID rather than URL. Within the TTL window the cached set is
//! the only source of truth; concurrent misses for the same API
//! coalesce into a single fetch.

use crate::errors::GatewayError;
use base64::{engine::general_purpose::STANDARD, Engine};
use moka::future::Cache;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const MAX_CACHED_APIS: u64 = 10_000;

/// A JSON Web Key. Only `kid`, `kty`, and `x5c` are consumed; the
/// remaining fields are tolerated for interop.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub alg: String,

    #[serde(default)]
    pub kty: String,

    #[serde(default, rename = "use")]
    pub key_use: String,

    /// X.509 certificate chain, base64 (standard) DER.
    #[serde(default)]
    pub x5c: Vec<String>,

    #[serde(default)]
    pub n: String,

    #[serde(default)]
    pub e: String,

    #[serde(default)]
    pub kid: String,

    #[serde(default)]
    pub x5t: String,
}

/// An ordered set of JWKs as served by an identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Process-wide cache of JWKS documents, keyed by API ID.
pub struct JwksCache {
    http_client: reqwest::Client,
    cache: Cache<String, Arc<JwkSet>>,
}

impl JwksCache {
    /// Build the cache. `ttl` bounds how long a fetched set is served;
    /// `fetch_timeout` bounds the blocking GET so a stuck identity
    /// provider cannot wedge the auth path.
    pub fn new(ttl: Duration, fetch_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(
                    target: "portcullis.auth.jwks",
                    error = %e,
                    "Failed to build HTTP client with custom config, using defaults"
                );
                reqwest::Client::new()
            });

        Self {
            http_client,
            cache: Cache::builder()
                .max_capacity(MAX_CACHED_APIS)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Return the DER bytes of the first certificate of the JWK whose
    /// `kid` matches and whose `kty` equals `key_type`
    /// case-insensitively, fetching the set from `url` on a cache miss.
    pub async fn get_secret_from_url(
        &self,
        api_id: &str,
        url: &str,
        kid: &str,
        key_type: &str,
    ) -> Result<Vec<u8>, GatewayError> {
        let jwks = self
            .cache
            .try_get_with(api_id.to_string(), self.fetch(url))
            .await
            .map_err(|e: Arc<GatewayError>| {
                GatewayError::KeyRetrievalFailed(e.to_string())
            })?;

        for jwk in &jwks.keys {
            if jwk.kid == kid && jwk.kty.eq_ignore_ascii_case(key_type) {
                let Some(first) = jwk.x5c.first() else {
                    return Err(GatewayError::NoCertificate);
                };
                return STANDARD.decode(first).map_err(|e| {
                    GatewayError::KeyRetrievalFailed(format!(
                        "invalid x5c encoding for kid {kid}: {e}"
                    ))
                });
            }
        }

        tracing::warn!(
            target: "portcullis.auth.jwks",
            kid = %kid,
            key_type = %key_type,
            "No matching KID in JWKS"
        );
        Err(GatewayError::NoMatchingKid)
    }

    async fn fetch(&self, url: &str) -> Result<Arc<JwkSet>, GatewayError> {
        tracing::debug!(target: "portcullis.auth.jwks", url = %url, "Pulling JWKS");

        let response = self.http_client.get(url).send().await.map_err(|e| {
            tracing::error!(target: "portcullis.auth.jwks", error = %e, "Failed to get resource URL");
            GatewayError::KeyRetrievalFailed(format!("fetch failed: {e}"))
        })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "portcullis.auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(GatewayError::KeyRetrievalFailed(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let body = response.text().await.map_err(|e| {
            GatewayError::KeyRetrievalFailed(format!("failed to read body: {e}"))
        })?;

        // The decode cause, not the fetch, is what the caller sees on
        // a malformed document.
        let jwks: JwkSet = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(target: "portcullis.auth.jwks", error = %e, "Failed to decode body JWK");
            GatewayError::KeyRetrievalFailed(format!("decode failed: {e}"))
        })?;

        tracing::info!(
            target: "portcullis.auth.jwks",
            key_count = jwks.keys.len(),
            "JWKS cached"
        );
        Ok(Arc::new(jwks))
    }
}
