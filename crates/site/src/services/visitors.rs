//! Visitor registry.
//!
//! Each browser gets a [`Visitor`]: its own session store and auth context,
//! looked up by the id kept in the cookie session. Idle visitors are evicted
//! after the session inactivity window and their auth context is disposed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cudliy_core::VisitorId;
use moka::future::Cache;
use moka::notification::RemovalCause;

use crate::auth::{AuthContext, ProfileErrorPolicy, SessionStore, SupabaseSessionStore};
use crate::supabase::SupabaseClient;

/// Upper bound on concurrently tracked visitors.
const MAX_VISITORS: u64 = 100_000;

/// One browser's auth state.
#[derive(Debug)]
pub struct Visitor {
    id: VisitorId,
    store: Arc<SupabaseSessionStore>,
    auth: AuthContext,
    submitting: AtomicBool,
}

impl Visitor {
    fn new(id: VisitorId, client: &Arc<SupabaseClient>, policy: ProfileErrorPolicy) -> Self {
        let store = Arc::new(SupabaseSessionStore::new(SupabaseClient::clone(client)));
        let auth = AuthContext::initialize(Arc::clone(&store), Arc::clone(client), policy);
        Self {
            id,
            store,
            auth,
            submitting: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn id(&self) -> VisitorId {
        self.id
    }

    #[must_use]
    pub fn store(&self) -> &SupabaseSessionStore {
        &self.store
    }

    #[must_use]
    pub const fn auth(&self) -> &AuthContext {
        &self.auth
    }

    /// Sequence of the store's most recent change; guards wait for the auth
    /// context to reach it.
    #[must_use]
    pub fn latest_seq(&self) -> u64 {
        self.store.latest_seq()
    }

    /// Mark a form submission as in flight.
    ///
    /// Returns `None` if another submission from this visitor is still
    /// running. The flag is cleared when the guard drops, on every path.
    #[must_use]
    pub fn begin_submission(&self) -> Option<SubmissionGuard<'_>> {
        self.submitting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SubmissionGuard {
                flag: &self.submitting,
            })
    }
}

/// In-flight marker for a form submission.
#[derive(Debug)]
pub struct SubmissionGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// All live visitors.
#[derive(Clone)]
pub struct VisitorRegistry {
    visitors: Cache<VisitorId, Arc<Visitor>>,
    client: Arc<SupabaseClient>,
    policy: ProfileErrorPolicy,
}

impl std::fmt::Debug for VisitorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisitorRegistry")
            .field("visitors", &self.visitors.entry_count())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl VisitorRegistry {
    #[must_use]
    pub fn new(client: SupabaseClient, policy: ProfileErrorPolicy, idle: Duration) -> Self {
        let visitors = Cache::builder()
            .max_capacity(MAX_VISITORS)
            .time_to_idle(idle)
            .eviction_listener(|id: Arc<VisitorId>, visitor: Arc<Visitor>, cause: RemovalCause| {
                tracing::debug!(visitor_id = %id, ?cause, "visitor evicted");
                visitor.auth.dispose();
            })
            .build();

        Self {
            visitors,
            client: Arc::new(client),
            policy,
        }
    }

    /// The visitor for `id`, created (and its auth context initialized) if
    /// it is not tracked yet.
    pub async fn get_or_create(&self, id: VisitorId) -> Arc<Visitor> {
        self.visitors
            .get_with(id, async {
                tracing::debug!(visitor_id = %id, "new visitor");
                Arc::new(Visitor::new(id, &self.client, self.policy))
            })
            .await
    }

    /// The visitor for `id` if it is still tracked.
    pub async fn get(&self, id: VisitorId) -> Option<Arc<Visitor>> {
        self.visitors.get(&id).await
    }

    /// Forget a visitor, disposing its auth context.
    pub async fn remove(&self, id: VisitorId) {
        self.visitors.invalidate(&id).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::config::SupabaseConfig;

    fn registry() -> VisitorRegistry {
        let config = SupabaseConfig {
            url: "http://127.0.0.1:9/".parse().unwrap(),
            anon_key: SecretString::from("anon"),
        };
        VisitorRegistry::new(
            SupabaseClient::new(&config).unwrap(),
            ProfileErrorPolicy::TreatAsMissing,
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_visitor() {
        let registry = registry();
        let id = VisitorId::random();
        let first = registry.get_or_create(id).await;
        let second = registry.get_or_create(id).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.id(), id);
        assert!(registry.get(VisitorId::random()).await.is_none());
    }

    #[tokio::test]
    async fn test_new_visitor_settles_signed_out() {
        let registry = registry();
        let visitor = registry.get_or_create(VisitorId::random()).await;
        let state = visitor
            .auth()
            .settled(visitor.latest_seq(), Duration::from_secs(2))
            .await
            .unwrap();
        assert!(!state.is_authenticated());
    }

    #[tokio::test]
    async fn test_remove_disposes_auth_context() {
        let registry = registry();
        let id = VisitorId::random();
        let visitor = registry.get_or_create(id).await;
        registry.remove(id).await;
        registry.visitors.run_pending_tasks().await;

        assert!(registry.get(id).await.is_none());
        assert!(visitor.auth().is_disposed());
    }

    #[tokio::test]
    async fn test_submission_guard_releases_on_drop() {
        let registry = registry();
        let visitor = registry.get_or_create(VisitorId::random()).await;

        let guard = visitor.begin_submission().unwrap();
        assert!(visitor.begin_submission().is_none());
        drop(guard);

        assert!(visitor.begin_submission().is_some());
    }
}
