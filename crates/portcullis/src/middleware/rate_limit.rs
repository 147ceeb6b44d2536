//! Rate-limit and quota middleware.
//!
//! Reads the session bound by the auth middleware, selects the base or
//! per-API session, and asks the limiter for a verdict. Updated
//! counters are persisted inline, or on a background task when async
//! session writes are enabled; in that mode counters may be visible
//! only after a short delay and callers must not rely on
//! read-after-write within the same request chain.

use super::client_origin;
use crate::context::{ContextKey, ContextValue, RequestContext};
use crate::errors::GatewayError;
use crate::events::{encode_request_snapshot, EventKind, EventMeta};
use crate::observability::metrics::{record_quota_violation, record_throttle};
use crate::routes::AppState;
use crate::session::limiter::LimitReason;
use crate::session::per_api_session_key;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Enforce rate and quota limits for the authenticated session.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    // The context is the only channel from the auth middleware; a
    // request without one never passed authentication.
    let ctx = req
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .ok_or(GatewayError::AccessDenied)?;
    let base_session = ctx.session().ok_or(GatewayError::AccessDenied)?;
    let auth_key = ctx.auth_key().ok_or(GatewayError::AccessDenied)?;

    let path = req.uri().path().to_string();
    let origin = client_origin(&req);

    // Use the per-API session when the base session maps this API and
    // the sub-session exists; otherwise fall back to the base key.
    let per_api_policy = base_session
        .policy_per_api
        .get(&state.api.api_id)
        .filter(|p| !p.is_empty())
        .cloned();
    let (mut session, limit_key) = match per_api_policy {
        Some(_) => {
            let api_key = per_api_session_key(&auth_key, &state.api.api_id);
            match state.session_store.get_session_detail(&api_key).await {
                Some(per_api) => (per_api, api_key),
                None => (base_session, auth_key.clone()),
            }
        }
        None => (base_session, auth_key.clone()),
    };

    let reason = state
        .limiter
        .forward_message(&mut session, &limit_key, state.session_store.as_ref())
        .await;

    if state.config.use_async_session_write {
        let store = Arc::clone(&state.session_store);
        let key = limit_key.clone();
        let snapshot = session.clone();
        tokio::spawn(async move {
            store.update_session(&key, &snapshot, 0).await;
        });

        let ctx_update = ctx.clone();
        let snapshot = session.clone();
        tokio::spawn(async move {
            ctx_update.set(ContextKey::SessionData, ContextValue::Session(snapshot));
        });
    } else {
        state
            .session_store
            .update_session(&limit_key, &session, 0)
            .await;
        ctx.set(
            ContextKey::SessionData,
            ContextValue::Session(session.clone()),
        );
    }

    match reason {
        LimitReason::Allowed => {
            if state.monitor.enabled() {
                let monitor = state.monitor.clone();
                let snapshot = session.clone();
                let key = limit_key.clone();
                tokio::spawn(async move {
                    monitor.check(&snapshot, &key);
                });
            }
            Ok(next.run(req).await)
        }
        LimitReason::RateLimited => {
            tracing::info!(
                target: "portcullis.limits",
                path = %path,
                origin = %origin,
                key = %limit_key,
                "Key rate limit exceeded"
            );
            state.events.fire(
                EventKind::RateLimitExceeded,
                EventMeta {
                    message: "Key Rate Limit Exceeded".to_string(),
                    path,
                    origin,
                    key: limit_key,
                    originating_request: encode_request_snapshot(
                        req.method(),
                        req.uri(),
                        req.headers(),
                    ),
                },
            );
            record_throttle(&state.api.api_id);
            Err(GatewayError::RateExceeded)
        }
        LimitReason::QuotaExceeded => {
            tracing::info!(
                target: "portcullis.limits",
                path = %path,
                origin = %origin,
                key = %limit_key,
                "Key quota limit exceeded"
            );
            state.events.fire(
                EventKind::QuotaExceeded,
                EventMeta {
                    message: "Key Quota Limit Exceeded".to_string(),
                    path,
                    origin,
                    key: limit_key,
                    originating_request: encode_request_snapshot(
                        req.method(),
                        req.uri(),
                        req.headers(),
                    ),
                },
            );
            record_quota_violation(&state.api.api_id);
            Err(GatewayError::QuotaExceeded)
        }
        LimitReason::Denied => Err(GatewayError::AccessDenied),
    }
}
