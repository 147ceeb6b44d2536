//! Portcullis gateway.
//!
//! Entry point: loads configuration and the API definition, loads
//! policies, wires the stores and caches, and serves the middleware
//! chain until shutdown.

use portcullis::config::{ApiSpec, Config};
use portcullis::events::{run_event_drain, EventDispatcher};
use portcullis::observability::init_metrics_recorder;
use portcullis::policy::{load_policies_from_file, PolicyRegistry};
use portcullis::routes::{build_routes, AppState};
use portcullis::storage::MemorySessionStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portcullis=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Portcullis gateway");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let api = ApiSpec::from_file(&config.api_spec_path).map_err(|e| {
        error!("Failed to load API definition: {}", e);
        e
    })?;

    info!(
        api_id = %api.api_id,
        org_id = %api.org_id,
        bind_address = %config.bind_address,
        central_authority = api.is_central_authority(),
        async_session_write = config.use_async_session_write,
        "Configuration loaded"
    );

    let policies = PolicyRegistry::new(load_policies_from_file(&config.policies_path));
    info!(count = policies.len(), "Policy registry ready");

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to install metrics recorder: {}", e);
        e
    })?;

    // The session store and the lower-level auth store share a backend
    // type but hold separate state. A distributed deployment swaps
    // these for a shared store implementation.
    let session_store = Arc::new(MemorySessionStore::new());
    let auth_store = Arc::new(MemorySessionStore::new());

    let (events, events_rx) = EventDispatcher::new();
    let cancel_token = CancellationToken::new();

    let drain_token = cancel_token.clone();
    let drain_handle = tokio::spawn(async move {
        run_event_drain(events_rx, drain_token).await;
    });

    let state = Arc::new(AppState::build(
        config.clone(),
        api,
        session_store,
        auth_store,
        policies,
        events,
    ));

    let app = build_routes(Arc::clone(&state), Some(metrics_handle));

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Portcullis listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(cancel_token.clone()))
    .await?;

    // Stop background tasks; in-flight session writes are not awaited.
    cancel_token.cancel();
    if let Err(e) = drain_handle.await {
        error!("Event drain task error: {}", e);
    }

    info!("Portcullis shutdown complete");
    Ok(())
}

/// Resolves when SIGINT or SIGTERM arrives, triggering the
/// cancellation token for coordinated shutdown.
async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    cancel_token.cancel();
}
