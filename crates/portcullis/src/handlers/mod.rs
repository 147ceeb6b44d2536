//! Terminal handlers for the middleware chain and the ops endpoints.

use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

/// Liveness response for the ops health endpoint.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub api_id: String,
    pub policies: usize,
}

/// Health check handler.
///
/// The gateway has no database; liveness reports which API this
/// instance fronts and how many policies are loaded.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        api_id: state.api.api_id.clone(),
        policies: state.policies.len(),
    })
}

/// End of the chain: the point where an accepted request is handed to
/// the reverse-proxy layer. Upstream dispatch lives outside this core,
/// so an accepted request simply answers 200 here.
pub async fn dispatch_upstream() -> (StatusCode, Json<DispatchResponse>) {
    (
        StatusCode::OK,
        Json(DispatchResponse {
            status: "ok".to_string(),
        }),
    )
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub status: String,
}
