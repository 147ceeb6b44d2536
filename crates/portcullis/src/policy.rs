//! Policy templates and the process-wide registry.
//!
//! Policies are immutable rate/quota/access templates owned by an
//! organization. The registry is read-mostly: readers take an `Arc`
//! snapshot of the whole map, and a reload replaces the map in one
//! swap. Sessions copy policy fields by value and never retain a
//! handle into the registry, so a reload cannot invalidate live
//! sessions.

use crate::session::AccessDefinition;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// A named template of rate, quota, and access rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub id: String,
    pub org_id: String,
    pub rate: f64,
    pub per: f64,
    pub quota_max: i64,
    pub quota_renewal_rate: i64,
    pub policy_per_api: HashMap<String, String>,
    pub access_rights: HashMap<String, AccessDefinition>,
    pub hmac_enabled: bool,
    pub active: bool,
    pub is_inactive: bool,
    pub tags: Vec<String>,
    pub key_expires_in: i64,
}

/// Process-wide policy-ID -> [`Policy`] mapping.
///
/// Cheap to clone; all clones share the same underlying map. Reads are
/// snapshots: a concurrent [`replace`](PolicyRegistry::replace) never
/// tears a reader.
#[derive(Clone, Default)]
pub struct PolicyRegistry {
    inner: Arc<RwLock<Arc<HashMap<String, Policy>>>>,
}

impl PolicyRegistry {
    pub fn new(policies: HashMap<String, Policy>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(policies))),
        }
    }

    /// Look up one policy by ID, copying it out of the current snapshot.
    pub fn get(&self, policy_id: &str) -> Option<Policy> {
        self.inner.read().get(policy_id).cloned()
    }

    /// Take a snapshot of the whole map.
    pub fn snapshot(&self) -> Arc<HashMap<String, Policy>> {
        Arc::clone(&self.inner.read())
    }

    /// Swap in a freshly loaded map. Existing snapshots keep reading
    /// the old one.
    pub fn replace(&self, policies: HashMap<String, Policy>) {
        *self.inner.write() = Arc::new(policies);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Load policies from a JSON document of the form
/// `{"<policy-id>": { ... }, ...}`.
///
/// Load failures are logged and yield an empty map so the gateway can
/// still boot; an API relying on policies will then refuse matching
/// tokens at request time.
pub fn load_policies_from_file(path: impl AsRef<Path>) -> HashMap<String, Policy> {
    let path = path.as_ref();
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(
                target: "portcullis.policy",
                path = %path.display(),
                error = %e,
                "Couldn't load policy file"
            );
            return HashMap::new();
        }
    };

    match serde_json::from_str::<HashMap<String, Policy>>(&raw) {
        Ok(policies) => {
            tracing::info!(
                target: "portcullis.policy",
                count = policies.len(),
                "Loaded policies"
            );
            policies
        }
        Err(e) => {
            tracing::error!(
                target: "portcullis.policy",
                path = %path.display(),
                error = %e,
                "Couldn't unmarshal policies"
            );
            HashMap::new()
        }
    }
}
