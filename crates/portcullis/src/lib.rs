//! Portcullis gateway core library.
//!
//! The authentication, policy, session, and rate-limit/quota core of
//! an API gateway middleware chain. A request passes through:
//!
//! ```text
//! headers -> middleware/auth -> (session/resolver | virtual session)
//!         -> context -> middleware/rate_limit -> dispatch handler
//! ```
//!
//! # Modules
//!
//! - `config` - process configuration and the per-API definition
//! - `errors` - error taxonomy with HTTP status mapping
//! - `auth` - JWKS retrieval/caching and JWT verification
//! - `session` - session state, resolution ladder, limiter, monitor
//! - `policy` - policy templates and the copy-on-write registry
//! - `storage` - abstract session store and the in-memory backend
//! - `context` - per-request context bag (closed key set)
//! - `events` - violation events and the drain task
//! - `middleware` - the auth and rate-limit chain stages
//! - `observability` - health metrics and the Prometheus recorder
//! - `routes` - router assembly and shared state

pub mod auth;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod policy;
pub mod routes;
pub mod session;
pub mod storage;
