//! Session resolution.
//!
//! The ladder: local cache, then session store, then the lower-level
//! auth store. A hit anywhere runs the policy overlay; a hit in the
//! auth store is also written back into the session store so the next
//! request takes the faster rung. When the base session maps the
//! current API to a policy, a per-API sub-session is materialized so
//! its counters are tracked independently.

use crate::config::ApiSpec;
use crate::policy::PolicyRegistry;
use crate::session::cache::LocalSessionCache;
use crate::session::{per_api_session_key, SessionState};
use crate::storage::SessionStore;
use std::sync::Arc;

/// Resolves caller keys into [`SessionState`] values for one API.
pub struct SessionResolver {
    api: ApiSpec,
    session_store: Arc<dyn SessionStore>,
    auth_store: Arc<dyn SessionStore>,
    cache: Arc<LocalSessionCache>,
    policies: PolicyRegistry,
}

impl SessionResolver {
    pub fn new(
        api: ApiSpec,
        session_store: Arc<dyn SessionStore>,
        auth_store: Arc<dyn SessionStore>,
        cache: Arc<LocalSessionCache>,
        policies: PolicyRegistry,
    ) -> Self {
        Self {
            api,
            session_store,
            auth_store,
            cache,
            policies,
        }
    }

    /// Resolve `key` to its base session, materializing the per-API
    /// sub-session for the current API when the base session calls for
    /// one. Only the base session is returned.
    pub async fn check_session_and_identity(&self, key: &str) -> Option<SessionState> {
        let base = self.check_and_validate(key).await?;

        if let Some(api_policy_id) = base.policy_per_api.get(&self.api.api_id) {
            if !api_policy_id.is_empty() {
                let api_key = per_api_session_key(key, &self.api.api_id);
                if self.check_and_validate(&api_key).await.is_none() {
                    // First sight of this key on this API: build the
                    // sub-session from the mapped policy. The apply ID
                    // is transient, so it is stripped once applied.
                    let mut per_api = SessionState {
                        apply_policy_id: api_policy_id.clone(),
                        ..Default::default()
                    };
                    self.apply_policy(&api_key, &mut per_api, true).await;
                }
            }
        }

        Some(base)
    }

    /// One rung-by-rung lookup of `key`, with cache population and
    /// policy overlay on every hit.
    pub async fn check_and_validate(&self, key: &str) -> Option<SessionState> {
        if let Some(mut session) = self.cache.get(key).await {
            tracing::debug!(target: "portcullis.session", key = %key, "Key found in local cache");
            self.apply_policy(key, &mut session, false).await;
            return Some(session);
        }

        if let Some(mut session) = self.session_store.get_session_detail(key).await {
            self.populate_cache_async(key, &session);
            self.apply_policy(key, &mut session, false).await;
            return Some(session);
        }

        if let Some(mut session) = self.auth_store.get_session_detail(key).await {
            tracing::info!(target: "portcullis.session", key = %key, "Recreating session for key");
            self.populate_cache_async(key, &session);
            self.apply_policy(key, &mut session, false).await;
            self.session_store
                .update_session(key, &session, self.api.session_lifetime)
                .await;
            return Some(session);
        }

        None
    }

    /// Overlay the policy named by `session.apply_policy_id`, if any.
    ///
    /// Registry misses and cross-organization policies leave the
    /// session unmodified; the refusal is logged, never surfaced.
    pub async fn apply_policy(
        &self,
        key: &str,
        session: &mut SessionState,
        strip_apply_id: bool,
    ) {
        if session.apply_policy_id.is_empty() {
            return;
        }

        let Some(policy) = self.policies.get(&session.apply_policy_id) else {
            tracing::warn!(
                target: "portcullis.session",
                policy_id = %session.apply_policy_id,
                "Session references unknown policy, leaving session as-is"
            );
            return;
        };

        // Ownership gate: a policy from another organisation must not
        // overwrite this key.
        if policy.org_id != self.api.org_id {
            tracing::error!(
                target: "portcullis.session",
                policy_id = %policy.id,
                policy_org = %policy.org_id,
                api_org = %self.api.org_id,
                "Attempting to apply policy from different organisation to key, skipping"
            );
            return;
        }

        session.allowance = policy.rate;
        session.rate = policy.rate;
        session.per = policy.per;
        session.quota_max = policy.quota_max;
        session.quota_renewal_rate = policy.quota_renewal_rate;
        session.policy_per_api = policy.policy_per_api.clone();
        session.access_rights = policy.access_rights.clone();
        session.hmac_enabled = policy.hmac_enabled;
        session.is_inactive = policy.is_inactive;
        session.tags = policy.tags.clone();

        if strip_apply_id {
            session.apply_policy_id = String::new();
        }

        self.session_store
            .update_session(key, session, self.api.session_lifetime)
            .await;
        tracing::debug!(target: "portcullis.session", key = %key, "Policy applied to key");
    }

    fn populate_cache_async(&self, key: &str, session: &SessionState) {
        if !self.cache.enabled() {
            return;
        }
        let cache = Arc::clone(&self.cache);
        let key = key.to_string();
        let session = session.clone();
        tokio::spawn(async move {
            cache.set(key, session).await;
        });
    }
}
