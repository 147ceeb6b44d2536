//! The middleware chain.
//!
//! Ordering is fixed: [`auth::authenticate`] resolves and binds the
//! session, then [`rate_limit::rate_limit`] enforces limits against
//! it. The request context in extensions is the only channel between
//! the two.

pub mod auth;
pub mod rate_limit;

use axum::extract::{ConnectInfo, Request};
use std::net::SocketAddr;

/// Best-effort client origin for logs and events.
pub(crate) fn client_origin(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string())
}
