//! Router assembly and shared application state.
//!
//! The chain order is fixed and load-bearing: authentication binds the
//! session into the request context, rate limiting reads it, and the
//! dispatch handler answers for the (out-of-scope) upstream proxy.

use crate::auth::{JwksCache, JwtAuthenticator};
use crate::config::{ApiSpec, Config};
use crate::events::EventDispatcher;
use crate::handlers;
use crate::middleware;
use crate::observability::metrics::record_request;
use crate::policy::PolicyRegistry;
use crate::session::cache::LocalSessionCache;
use crate::session::limiter::SessionLimiter;
use crate::session::monitor::Monitor;
use crate::session::resolver::SessionResolver;
use crate::storage::SessionStore;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers and middlewares.
pub struct AppState {
    pub config: Config,
    pub api: ApiSpec,
    pub session_store: Arc<dyn SessionStore>,
    pub auth_store: Arc<dyn SessionStore>,
    pub policies: PolicyRegistry,
    pub session_cache: Arc<LocalSessionCache>,
    pub jwks: Arc<JwksCache>,
    pub resolver: Arc<SessionResolver>,
    pub authenticator: Arc<JwtAuthenticator>,
    pub limiter: SessionLimiter,
    pub events: EventDispatcher,
    pub monitor: Monitor,
}

impl AppState {
    /// Wire up the caches, resolver, and authenticator for one API.
    ///
    /// Both caches are created here, once, at startup; nothing is
    /// lazily initialized on the hot path.
    pub fn build(
        config: Config,
        api: ApiSpec,
        session_store: Arc<dyn SessionStore>,
        auth_store: Arc<dyn SessionStore>,
        policies: PolicyRegistry,
        events: EventDispatcher,
    ) -> Self {
        let session_cache = Arc::new(LocalSessionCache::new(
            !config.disable_local_session_cache,
            Duration::from_secs(config.local_cache_ttl_secs),
        ));
        let jwks = Arc::new(JwksCache::new(
            Duration::from_secs(config.jwks_cache_ttl_secs),
            Duration::from_secs(config.jwks_fetch_timeout_secs),
        ));
        let resolver = Arc::new(SessionResolver::new(
            api.clone(),
            Arc::clone(&session_store),
            Arc::clone(&auth_store),
            Arc::clone(&session_cache),
            policies.clone(),
        ));
        let authenticator = Arc::new(JwtAuthenticator::new(
            api.clone(),
            Arc::clone(&resolver),
            Arc::clone(&jwks),
            Arc::clone(&session_store),
            policies.clone(),
        ));
        let monitor = Monitor::new(config.monitor.clone(), events.clone());

        Self {
            config,
            api,
            session_store,
            auth_store,
            policies,
            session_cache,
            jwks,
            resolver,
            authenticator,
            limiter: SessionLimiter,
            events,
            monitor,
        }
    }
}

/// Build the application router.
///
/// - every non-ops path runs the auth -> rate-limit chain and lands in
///   the dispatch handler
/// - `/portcullis/health` liveness, `/portcullis/metrics` Prometheus
/// - TraceLayer request logging and a 30s request timeout outermost
pub fn build_routes(state: Arc<AppState>, metrics_handle: Option<PrometheusHandle>) -> Router {
    let mut ops = Router::new()
        .route("/portcullis/health", get(handlers::health_check))
        .with_state(Arc::clone(&state));

    if let Some(handle) = metrics_handle {
        ops = ops.route(
            "/portcullis/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );
    }

    // Layer order (outermost last): metrics wraps the whole chain,
    // auth runs before rate limiting.
    let protected = Router::new()
        .fallback(handlers::dispatch_upstream)
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::rate_limit::rate_limit,
        ))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::auth::authenticate,
        ))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            track_request,
        ));

    ops.merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}

/// Record the request-log health sample with total chain latency.
async fn track_request(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(req).await;
    record_request(
        &state.api.api_id,
        response.status().as_u16(),
        start.elapsed(),
    );
    response
}
