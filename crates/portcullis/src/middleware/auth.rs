//! JWT authentication middleware.
//!
//! Extracts the bearer credential from the configured sources,
//! verifies it, and binds the resolved session into the request
//! context for the rest of the chain. Failures fire an `AuthFailed`
//! event and record a key-failure health sample.

use super::client_origin;
use crate::auth::strip_bearer;
use crate::config::ApiSpec;
use crate::context::{ContextKey, ContextValue, RequestContext};
use crate::errors::GatewayError;
use crate::events::{encode_request_snapshot, EventKind, EventMeta};
use crate::observability::metrics::record_key_failure;
use crate::routes::AppState;
use axum::{
    extract::{Query, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Authenticate the request and bind its session.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let path = req.uri().path().to_string();
    let origin = client_origin(&req);

    let raw = extract_credential(&state.api, &req).unwrap_or_default();
    let token = strip_bearer(&raw);
    if token.is_empty() {
        tracing::info!(
            target: "portcullis.auth",
            path = %path,
            origin = %origin,
            "Attempted access with malformed header, no JWT auth header found"
        );
        report_auth_failure(&state, &req, &path, &origin, "");
        return Err(GatewayError::MissingAuth);
    }

    match state.authenticator.authenticate(&token).await {
        Ok(outcome) => {
            let ctx = RequestContext::new();
            ctx.set(
                ContextKey::SessionData,
                ContextValue::Session(outcome.session),
            );
            ctx.set(
                ContextKey::AuthHeaderValue,
                ContextValue::Text(outcome.key_id),
            );
            req.extensions_mut().insert(ctx);
            Ok(next.run(req).await)
        }
        Err(err) => {
            tracing::info!(
                target: "portcullis.auth",
                path = %path,
                origin = %origin,
                error = %err,
                "Attempted JWT access with non-existent key"
            );
            report_auth_failure(&state, &req, &path, &origin, "");
            Err(err)
        }
    }
}

fn report_auth_failure(state: &AppState, req: &Request, path: &str, origin: &str, key: &str) {
    state.events.fire(
        EventKind::AuthFailed,
        EventMeta {
            message: "Auth Failure".to_string(),
            path: path.to_string(),
            origin: origin.to_string(),
            key: key.to_string(),
            originating_request: encode_request_snapshot(req.method(), req.uri(), req.headers()),
        },
    );
    record_key_failure(&state.api.api_id);
}

/// Pull the raw credential from the configured sources, first match
/// wins: header, then query/form parameter, then cookie.
fn extract_credential(api: &ApiSpec, req: &Request) -> Option<String> {
    let name = &api.auth.auth_header_name;

    if let Some(value) = req
        .headers()
        .get(name.as_str())
        .and_then(|v| v.to_str().ok())
    {
        if !value.trim().is_empty() {
            return Some(value.to_string());
        }
    }

    if api.auth.use_param {
        if let Ok(Query(params)) = Query::<HashMap<String, String>>::try_from_uri(req.uri()) {
            if let Some(value) = params.get(name) {
                if !value.is_empty() {
                    return Some(value.clone());
                }
            }
        }
    }

    if api.auth.use_cookie {
        if let Some(value) = cookie_value(req.headers(), name) {
            if !value.is_empty() {
                return Some(value);
            }
        }
    }

    None
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get("cookie")?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}
