//! Per-request context.
//!
//! The single channel by which authentication state reaches the
//! rate-limit middleware: the auth middleware resolves a session once,
//! binds it here, and everything downstream reads the same resolution.
//! The key space is a closed enumeration; the bag is dropped with the
//! request.

use crate::session::SessionState;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Closed enumeration of context slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ContextKey {
    SessionData = 0,
    AuthHeaderValue = 1,
    VersionData = 2,
    VersionKeyContext = 3,
}

/// Values a context slot can hold.
#[derive(Debug, Clone)]
pub enum ContextValue {
    Session(SessionState),
    Text(String),
}

/// Request-scoped key/value bag. Cheap to clone; all clones share the
/// same slots, so a value written by one middleware (or a background
/// task it spawned) is visible to later readers of the same request.
#[derive(Clone, Default)]
pub struct RequestContext {
    slots: Arc<RwLock<HashMap<ContextKey, ContextValue>>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: ContextKey, value: ContextValue) {
        self.slots.write().insert(key, value);
    }

    pub fn get(&self, key: ContextKey) -> Option<ContextValue> {
        self.slots.read().get(&key).cloned()
    }

    /// Convenience accessor for the bound session.
    pub fn session(&self) -> Option<SessionState> {
        match self.get(ContextKey::SessionData) {
            Some(ContextValue::Session(s)) => Some(s),
            _ => None,
        }
    }

    /// Convenience accessor for the resolved auth key ID.
    pub fn auth_key(&self) -> Option<String> {
        match self.get(ContextKey::AuthHeaderValue) {
            Some(ContextValue::Text(key)) => Some(key),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_key_discriminants_are_stable() {
        assert_eq!(ContextKey::SessionData as u8, 0);
        assert_eq!(ContextKey::AuthHeaderValue as u8, 1);
        assert_eq!(ContextKey::VersionData as u8, 2);
        assert_eq!(ContextKey::VersionKeyContext as u8, 3);
    }

    #[test]
    fn test_set_get_session_and_key() {
        let ctx = RequestContext::new();
        assert!(ctx.session().is_none());
        assert!(ctx.auth_key().is_none());

        let session = SessionState {
            rate: 10.0,
            ..Default::default()
        };
        ctx.set(ContextKey::SessionData, ContextValue::Session(session));
        ctx.set(
            ContextKey::AuthHeaderValue,
            ContextValue::Text("k1".to_string()),
        );

        assert_eq!(ctx.session().unwrap().rate, 10.0);
        assert_eq!(ctx.auth_key().unwrap(), "k1");
    }

    #[test]
    fn test_clones_share_slots() {
        let ctx = RequestContext::new();
        let clone = ctx.clone();

        clone.set(
            ContextKey::VersionData,
            ContextValue::Text("v2".to_string()),
        );

        match ctx.get(ContextKey::VersionData) {
            Some(ContextValue::Text(v)) => assert_eq!(v, "v2"),
            other => panic!("expected text slot, got {other:?}"),
        }
    }

    #[test]
    fn test_mismatched_slot_type_reads_as_none() {
        let ctx = RequestContext::new();
        ctx.set(
            ContextKey::SessionData,
            ContextValue::Text("not a session".to_string()),
        );
        assert!(ctx.session().is_none());
    }
}
