//! Shared harness for gateway integration tests.
//!
//! Builds a full router (auth -> rate-limit -> dispatch) over
//! in-memory stores, with hooks to seed sessions and observe fired
//! events.

#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)] // Not every test file uses every helper

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use portcullis::config::{ApiSpec, Config};
use portcullis::events::{Event, EventDispatcher};
use portcullis::policy::{Policy, PolicyRegistry};
use portcullis::routes::{build_routes, AppState};
use portcullis::session::SessionState;
use portcullis::storage::{MemorySessionStore, SessionStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;

pub struct TestGateway {
    pub router: Router,
    pub session_store: Arc<MemorySessionStore>,
    pub auth_store: Arc<MemorySessionStore>,
    pub events: UnboundedReceiver<Event>,
}

impl TestGateway {
    /// Issue a GET with an optional Authorization header value.
    pub async fn get(&self, path: &str, authorization: Option<&str>) -> StatusCode {
        let mut builder = Request::builder().uri(path);
        if let Some(value) = authorization {
            builder = builder.header("Authorization", value);
        }
        let request = builder.body(Body::empty()).unwrap();
        self.router
            .clone()
            .oneshot(request)
            .await
            .unwrap()
            .status()
    }

    /// Issue a GET with a bearer token.
    pub async fn get_bearer(&self, path: &str, token: &str) -> StatusCode {
        self.get(path, Some(&format!("Bearer {token}"))).await
    }

    /// Issue a GET with a bearer token and return status plus parsed
    /// JSON body.
    pub async fn get_bearer_json(
        &self,
        path: &str,
        token: &str,
    ) -> (StatusCode, serde_json::Value) {
        use http_body_util::BodyExt;

        let request = Request::builder()
            .uri(path)
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    /// Issue an arbitrary request through the chain.
    pub async fn send(&self, request: Request<Body>) -> StatusCode {
        self.router
            .clone()
            .oneshot(request)
            .await
            .unwrap()
            .status()
    }

    /// Seed a session directly into the session store.
    pub async fn seed_session(&self, key: &str, session: &SessionState) {
        self.session_store.update_session(key, session, 0).await;
    }

    /// Read a session back from the session store.
    pub async fn stored_session(&self, key: &str) -> Option<SessionState> {
        self.session_store.get_session_detail(key).await
    }

    /// Pop the next fired event, if any.
    pub fn next_event(&mut self) -> Option<Event> {
        self.events.try_recv().ok()
    }
}

pub fn test_config() -> Config {
    Config::from_vars(&HashMap::from([(
        "PORTCULLIS_API_SPEC".to_string(),
        "unused.json".to_string(),
    )]))
    .expect("test config")
}

/// A direct-mode HMAC API with per-key session secrets.
pub fn direct_hmac_api(api_id: &str, org_id: &str) -> ApiSpec {
    ApiSpec {
        api_id: api_id.to_string(),
        name: format!("{api_id} test api"),
        org_id: org_id.to_string(),
        jwt_signing_method: "hmac".to_string(),
        session_lifetime: 3600,
        ..Default::default()
    }
}

/// A central-authority ECDSA API bound to a JWKS endpoint.
pub fn central_ecdsa_api(api_id: &str, org_id: &str, jwks_url: &str) -> ApiSpec {
    ApiSpec {
        api_id: api_id.to_string(),
        name: format!("{api_id} test api"),
        org_id: org_id.to_string(),
        jwt_signing_method: "ecdsa".to_string(),
        jwt_source: jwks_url.to_string(),
        jwt_identity_base_field: "email".to_string(),
        jwt_policy_field_name: "pol".to_string(),
        session_lifetime: 3600,
        ..Default::default()
    }
}

/// A session carrying an HMAC secret and the given limits.
pub fn hmac_session(secret: &str, rate: f64, per: f64, quota_max: i64) -> SessionState {
    SessionState {
        allowance: rate,
        rate,
        per,
        quota_max,
        quota_remaining: quota_max,
        quota_renewal_rate: 3600,
        jwt_data: portcullis::session::JwtData {
            secret: secret.to_string(),
        },
        ..Default::default()
    }
}

pub fn policy(id: &str, org_id: &str, rate: f64, per: f64, quota_max: i64) -> Policy {
    Policy {
        id: id.to_string(),
        org_id: org_id.to_string(),
        rate,
        per,
        quota_max,
        quota_renewal_rate: 3600,
        active: true,
        ..Default::default()
    }
}

/// Build a gateway with fresh stores.
pub fn gateway(api: ApiSpec, policies: HashMap<String, Policy>) -> TestGateway {
    gateway_with(api, policies, test_config())
}

/// Build a gateway with a custom process config.
pub fn gateway_with(
    api: ApiSpec,
    policies: HashMap<String, Policy>,
    config: Config,
) -> TestGateway {
    let session_store = Arc::new(MemorySessionStore::new());
    let auth_store = Arc::new(MemorySessionStore::new());
    gateway_with_stores(api, policies, config, session_store, auth_store)
}

/// Build a gateway over existing stores, so several APIs can share
/// session state the way gateway processes share a backend.
pub fn gateway_with_stores(
    api: ApiSpec,
    policies: HashMap<String, Policy>,
    config: Config,
    session_store: Arc<MemorySessionStore>,
    auth_store: Arc<MemorySessionStore>,
) -> TestGateway {
    let (events, events_rx) = EventDispatcher::new();
    let state = Arc::new(AppState::build(
        config,
        api,
        session_store.clone() as Arc<dyn SessionStore>,
        auth_store.clone() as Arc<dyn SessionStore>,
        PolicyRegistry::new(policies),
        events,
    ));

    TestGateway {
        router: build_routes(state, None),
        session_store,
        auth_store,
        events: events_rx,
    }
}
