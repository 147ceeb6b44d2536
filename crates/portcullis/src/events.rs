//! Gateway event emission.
//!
//! Violations (auth failures, rate and quota breaches, monitor
//! triggers) are published to an in-process channel and drained by a
//! background task. Firing is non-blocking; a full or closed channel
//! is logged and the event dropped, never failing the request.

use axum::http::{HeaderMap, Method, Uri};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Kinds of events the gateway can fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    AuthFailed,
    RateLimitExceeded,
    QuotaExceeded,
    TriggerExceeded,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AuthFailed => "AuthFailed",
            EventKind::RateLimitExceeded => "RateLimitExceeded",
            EventKind::QuotaExceeded => "QuotaExceeded",
            EventKind::TriggerExceeded => "TriggerExceeded",
        }
    }
}

/// Payload common to all events.
#[derive(Debug, Clone, Serialize)]
pub struct EventMeta {
    pub message: String,
    pub path: String,
    pub origin: String,
    pub key: String,

    /// Base64-encoded snapshot of the originating request.
    pub originating_request: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub meta: EventMeta,
}

/// Handle used by middlewares to publish events.
#[derive(Clone)]
pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventDispatcher {
    /// Create a dispatcher and the receiver for its drain task.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Publish an event. Never blocks; a send failure is logged and
    /// the event discarded.
    pub fn fire(&self, kind: EventKind, meta: EventMeta) {
        if let Err(e) = self.tx.send(Event { kind, meta }) {
            tracing::error!(
                target: "portcullis.events",
                error = %e,
                "Dropped event, drain task gone"
            );
        }
    }
}

/// Drain loop run as a background task: logs each event until the
/// cancellation token fires.
pub async fn run_event_drain(
    mut rx: mpsc::UnboundedReceiver<Event>,
    cancel_token: CancellationToken,
) {
    tracing::info!(target: "portcullis.events", "Event drain task started");

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(event) => {
                        tracing::info!(
                            target: "portcullis.events",
                            kind = event.kind.as_str(),
                            path = %event.meta.path,
                            origin = %event.meta.origin,
                            key = %event.meta.key,
                            "{}", event.meta.message
                        );
                    }
                    None => break,
                }
            }
            _ = cancel_token.cancelled() => {
                tracing::info!(
                    target: "portcullis.events",
                    "Event drain task received shutdown signal, exiting"
                );
                break;
            }
        }
    }
}

/// Encode a wire-ish snapshot of the request for event payloads:
/// the request line plus headers, base64-encoded.
pub fn encode_request_snapshot(method: &Method, uri: &Uri, headers: &HeaderMap) -> String {
    let mut raw = format!("{method} {uri} HTTP/1.1\r\n");
    for (name, value) in headers {
        raw.push_str(name.as_str());
        raw.push_str(": ");
        raw.push_str(value.to_str().unwrap_or("<binary>"));
        raw.push_str("\r\n");
    }
    STANDARD.encode(raw.as_bytes())
}
