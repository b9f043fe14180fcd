//! Per-visitor auth context.
//!
//! An [`AuthContext`] is an actor: one task owns the [`AuthState`] and
//! applies, strictly one at a time, the initial session fetch, every auth
//! state change from the store, and the `refresh_profile` / `sign_out`
//! commands. Readers get snapshots through a `watch` channel and never see
//! a half-applied update.
//!
//! # Lifecycle
//!
//! `initialize` subscribes to the store *before* fetching the session, so
//! no change is missed, then spawns the actor. The initial fetch is applied
//! before anything queued behind it, and `loading` turns false once it has
//! been applied (successfully or not). `dispose` stops both tasks; any
//! result that arrives afterwards is discarded.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cudliy_core::{Profile, Segment};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::{AuthChange, ProfileSource, SessionStore, Stamped, Subscription};
use crate::supabase::{AuthSession, AuthUser, SupabaseError};

const COMMAND_BUFFER: usize = 32;

/// How a failed profile fetch is reflected in the auth state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProfileErrorPolicy {
    /// Log a warning and treat the profile as missing (guards then send the
    /// visitor to onboarding).
    #[default]
    TreatAsMissing,
    /// Record the failure so guards can show an "unavailable" page.
    Surface,
}

impl FromStr for ProfileErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "treat-as-missing" | "missing" => Ok(Self::TreatAsMissing),
            "surface" => Ok(Self::Surface),
            other => Err(format!(
                "expected treat-as-missing or surface, got '{other}'"
            )),
        }
    }
}

/// Errors from auth context commands.
#[derive(Debug, Error)]
pub enum AuthContextError {
    /// The context was disposed before the command completed.
    #[error("auth context disposed")]
    Disposed,

    /// Revoking the session server-side failed. The local state is cleared
    /// regardless.
    #[error("sign out failed: {0}")]
    SignOut(#[source] SupabaseError),
}

/// Snapshot of a visitor's auth state.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub session: Option<AuthSession>,
    pub user: Option<AuthUser>,
    pub profile: Option<Profile>,
    /// True until the initial session fetch has been applied.
    pub loading: bool,
    /// Set only under [`ProfileErrorPolicy::Surface`] when the last profile
    /// fetch failed.
    pub profile_error: Option<String>,
    /// Store sequence of the last change folded into this state.
    pub applied_seq: u64,
}

impl AuthState {
    fn initial() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// The profile's segment, if onboarding is complete.
    #[must_use]
    pub fn segment(&self) -> Option<Segment> {
        self.profile.as_ref().and_then(|profile| profile.segment)
    }

    fn set_session(&mut self, session: Option<AuthSession>) {
        self.user = session.as_ref().map(|session| session.user().clone());
        self.session = session;
    }

    fn clear(&mut self) {
        self.session = None;
        self.user = None;
        self.profile = None;
        self.profile_error = None;
    }
}

enum Command {
    Change(AuthChange),
    Resync,
    RefreshProfile(oneshot::Sender<()>),
    SignOut(oneshot::Sender<Result<(), SupabaseError>>),
}

/// Handle to a running auth context.
///
/// Dropping the handle disposes the context.
#[derive(Debug)]
pub struct AuthContext {
    state: watch::Receiver<AuthState>,
    commands: mpsc::Sender<Command>,
    alive: Arc<AtomicBool>,
    actor: JoinHandle<()>,
    forwarder: JoinHandle<()>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Change(change) => write!(f, "Change({}, seq {})", change.event, change.seq),
            Self::Resync => f.write_str("Resync"),
            Self::RefreshProfile(_) => f.write_str("RefreshProfile"),
            Self::SignOut(_) => f.write_str("SignOut"),
        }
    }
}

impl AuthContext {
    /// Subscribe to `store`, then start the actor that fetches the initial
    /// session and profile.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn initialize<S, P>(store: Arc<S>, profiles: Arc<P>, policy: ProfileErrorPolicy) -> Self
    where
        S: SessionStore,
        P: ProfileSource,
    {
        let subscription = store.on_auth_state_change();
        let (publisher, state) = watch::channel(AuthState::initial());
        let (commands, queue) = mpsc::channel(COMMAND_BUFFER);
        let alive = Arc::new(AtomicBool::new(true));

        let forwarder = tokio::spawn(forward(subscription, commands.clone()));
        let actor = tokio::spawn(
            Actor {
                store,
                profiles,
                policy,
                publisher,
                alive: Arc::clone(&alive),
                state: AuthState::initial(),
            }
            .run(queue),
        );

        Self {
            state,
            commands,
            alive,
            actor,
            forwarder,
        }
    }

    /// The current state.
    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Wait until the initial fetch is done and every change up to
    /// `target_seq` has been applied, for at most `timeout`.
    ///
    /// Returns `None` on timeout or if the context is disposed.
    pub async fn settled(&self, target_seq: u64, timeout: Duration) -> Option<AuthState> {
        let mut state = self.state.clone();
        let caught_up = state.wait_for(|s| !s.loading && s.applied_seq >= target_seq);
        match tokio::time::timeout(timeout, caught_up).await {
            Ok(Ok(snapshot)) => Some(snapshot.clone()),
            Ok(Err(_)) | Err(_) => None,
        }
    }

    /// Re-fetch the profile for the current user and wait for the new state
    /// to be published.
    ///
    /// # Errors
    ///
    /// Returns [`AuthContextError::Disposed`] if the context is gone.
    pub async fn refresh_profile(&self) -> Result<(), AuthContextError> {
        let (reply, done) = oneshot::channel();
        self.send(Command::RefreshProfile(reply)).await?;
        done.await.map_err(|_| AuthContextError::Disposed)
    }

    /// End the session and clear user, session and profile.
    ///
    /// # Errors
    ///
    /// Returns [`AuthContextError::SignOut`] if revoking the session failed
    /// (local state is cleared anyway) and [`AuthContextError::Disposed`] if
    /// the context is gone.
    pub async fn sign_out(&self) -> Result<(), AuthContextError> {
        let (reply, done) = oneshot::channel();
        self.send(Command::SignOut(reply)).await?;
        done.await
            .map_err(|_| AuthContextError::Disposed)?
            .map_err(AuthContextError::SignOut)
    }

    /// Stop the actor and the subscription. Idempotent.
    pub fn dispose(&self) {
        self.alive.store(false, Ordering::Release);
        self.forwarder.abort();
        self.actor.abort();
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        !self.alive.load(Ordering::Acquire)
    }

    async fn send(&self, command: Command) -> Result<(), AuthContextError> {
        if self.is_disposed() {
            return Err(AuthContextError::Disposed);
        }
        self.commands
            .send(command)
            .await
            .map_err(|_| AuthContextError::Disposed)
    }
}

impl Drop for AuthContext {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Pump store changes into the actor's queue.
async fn forward(mut subscription: Subscription, commands: mpsc::Sender<Command>) {
    loop {
        let command = match subscription.recv().await {
            Ok(change) => Command::Change(change),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "auth changes dropped, resyncing");
                Command::Resync
            }
            Err(RecvError::Closed) => break,
        };
        if commands.send(command).await.is_err() {
            break;
        }
    }
}

struct Actor<S, P> {
    store: Arc<S>,
    profiles: Arc<P>,
    policy: ProfileErrorPolicy,
    publisher: watch::Sender<AuthState>,
    alive: Arc<AtomicBool>,
    state: AuthState,
}

impl<S: SessionStore, P: ProfileSource> Actor<S, P> {
    async fn run(mut self, mut queue: mpsc::Receiver<Command>) {
        self.resync().await;

        while let Some(command) = queue.recv().await {
            tracing::trace!(?command, "auth context command");
            match command {
                Command::Change(change) => self.apply(change).await,
                Command::Resync => self.resync().await,
                Command::RefreshProfile(reply) => {
                    self.refresh_profile().await;
                    let _ = reply.send(());
                }
                Command::SignOut(reply) => {
                    let result = self.sign_out().await;
                    let _ = reply.send(result);
                }
            }
        }
    }

    /// Fetch the session from the store and rebuild the state from it.
    async fn resync(&mut self) {
        let observed = self.store.latest_seq();
        match self.store.get_session().await {
            Ok(Stamped { seq, value }) if seq >= self.state.applied_seq => {
                self.state.set_session(value);
                self.load_profile().await;
                self.state.applied_seq = seq;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "failed to fetch auth session, treating visitor as signed out");
                self.state.clear();
                self.state.applied_seq = self.state.applied_seq.max(observed);
            }
        }
        self.state.loading = false;
        self.publish();
    }

    async fn apply(&mut self, change: AuthChange) {
        if change.seq <= self.state.applied_seq {
            tracing::debug!(
                seq = change.seq,
                applied = self.state.applied_seq,
                event = %change.event,
                "skipping stale auth change"
            );
            return;
        }

        self.state.set_session(change.session);
        self.load_profile().await;
        self.state.applied_seq = change.seq;
        self.publish();
    }

    async fn refresh_profile(&mut self) {
        // Pick up a refreshed token first so the fetch is authorized.
        match self.store.get_session().await {
            Ok(Stamped { seq, value }) if seq > self.state.applied_seq => {
                self.state.set_session(value);
                self.state.applied_seq = seq;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "failed to refresh session before profile fetch"),
        }
        self.load_profile().await;
        self.publish();
    }

    async fn sign_out(&mut self) -> Result<(), SupabaseError> {
        let Stamped { seq, value } = self.store.sign_out().await;
        self.state.clear();
        self.state.applied_seq = self.state.applied_seq.max(seq);
        self.publish();
        if let Err(e) = &value {
            tracing::warn!(error = %e, "failed to revoke session server-side");
        }
        value
    }

    async fn load_profile(&mut self) {
        self.state.profile_error = None;
        let Some(session) = self.state.session.clone() else {
            self.state.profile = None;
            return;
        };

        match self.profiles.fetch_profile(&session).await {
            Ok(profile) => self.state.profile = profile,
            Err(e) => {
                self.state.profile = None;
                match self.policy {
                    ProfileErrorPolicy::TreatAsMissing => {
                        tracing::warn!(
                            error = %e,
                            user_id = %session.user().id,
                            "profile fetch failed, treating profile as missing"
                        );
                    }
                    ProfileErrorPolicy::Surface => {
                        tracing::error!(
                            error = %e,
                            user_id = %session.user().id,
                            "profile fetch failed"
                        );
                        self.state.profile_error = Some(e.user_message());
                    }
                }
            }
        }
    }

    fn publish(&self) {
        if !self.alive.load(Ordering::Acquire) {
            return;
        }
        self.publisher.send_replace(self.state.clone());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use chrono::Utc;
    use cudliy_core::UserId;
    use secrecy::SecretString;
    use tokio::sync::broadcast;

    use super::*;
    use crate::auth::AuthEvent;
    use crate::supabase::auth::UserMetadata;

    const SETTLE: Duration = Duration::from_secs(2);

    pub(crate) fn session_for(id: UserId, email: &str) -> AuthSession {
        AuthSession::new(
            SecretString::from(format!("access-{id}")),
            SecretString::from(format!("refresh-{id}")),
            Utc::now() + chrono::Duration::hours(1),
            AuthUser {
                id,
                email: Some(email.to_string()),
                user_metadata: UserMetadata::default(),
            },
        )
    }

    /// In-memory store with controllable latency and failures.
    #[derive(Default)]
    pub(crate) struct MockStore {
        state: Mutex<(Option<AuthSession>, u64)>,
        events: Option<broadcast::Sender<AuthChange>>,
        get_delay: Mutex<Duration>,
        fail_get: AtomicBool,
        pub(crate) sign_out_calls: AtomicUsize,
    }

    impl MockStore {
        pub(crate) fn new() -> Self {
            let (events, _) = broadcast::channel(16);
            Self {
                events: Some(events),
                ..Self::default()
            }
        }

        fn sender(&self) -> &broadcast::Sender<AuthChange> {
            self.events.as_ref().unwrap()
        }

        pub(crate) fn commit(&self, session: Option<AuthSession>, event: AuthEvent) -> u64 {
            let mut state = self.state.lock().unwrap();
            state.1 += 1;
            state.0 = session.clone();
            let seq = state.1;
            let _ = self.sender().send(AuthChange {
                seq,
                event,
                session,
            });
            seq
        }

        /// Deliver a change without touching the store state.
        fn inject(&self, change: AuthChange) {
            let _ = self.sender().send(change);
        }

        fn set_get_delay(&self, delay: Duration) {
            *self.get_delay.lock().unwrap() = delay;
        }
    }

    impl SessionStore for MockStore {
        async fn get_session(&self) -> Result<Stamped<Option<AuthSession>>, SupabaseError> {
            // Read first, then stall: models a fetch whose answer is already
            // stale by the time it lands.
            let (value, seq) = self.state.lock().unwrap().clone();
            let delay = *self.get_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.fail_get.load(Ordering::SeqCst) {
                return Err(SupabaseError::Parse("session storage unavailable".to_string()));
            }
            Ok(Stamped { seq, value })
        }

        fn on_auth_state_change(&self) -> Subscription {
            let state = self.state.lock().unwrap();
            let receiver = self.sender().subscribe();
            Subscription::new(
                AuthChange {
                    seq: state.1,
                    event: AuthEvent::InitialSession,
                    session: state.0.clone(),
                },
                receiver,
            )
        }

        async fn sign_out(&self) -> Stamped<Result<(), SupabaseError>> {
            self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
            let seq = self.commit(None, AuthEvent::SignedOut);
            Stamped { seq, value: Ok(()) }
        }

        fn latest_seq(&self) -> u64 {
            self.state.lock().unwrap().1
        }
    }

    /// In-memory profiles table.
    #[derive(Default)]
    pub(crate) struct MockProfiles {
        rows: Mutex<HashMap<UserId, Profile>>,
        fail: AtomicBool,
        pub(crate) calls: AtomicUsize,
    }

    impl MockProfiles {
        pub(crate) fn put(&self, id: UserId, segment: Option<Segment>) {
            self.rows.lock().unwrap().insert(
                id,
                Profile {
                    id,
                    full_name: Some("Ada Maker".to_string()),
                    segment,
                    created_at: None,
                    updated_at: None,
                },
            );
        }
    }

    impl ProfileSource for MockProfiles {
        async fn fetch_profile(&self, session: &AuthSession) -> Result<Option<Profile>, SupabaseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(SupabaseError::Api {
                    status: 503,
                    code: None,
                    message: "profiles unavailable".to_string(),
                });
            }
            Ok(self.rows.lock().unwrap().get(&session.user().id).cloned())
        }
    }

    fn context(store: &Arc<MockStore>, profiles: &Arc<MockProfiles>) -> AuthContext {
        AuthContext::initialize(
            Arc::clone(store),
            Arc::clone(profiles),
            ProfileErrorPolicy::TreatAsMissing,
        )
    }

    #[tokio::test]
    async fn test_initialize_without_session() {
        let store = Arc::new(MockStore::new());
        let profiles = Arc::new(MockProfiles::default());
        let ctx = context(&store, &profiles);

        let state = ctx.settled(0, SETTLE).await.unwrap();
        assert!(!state.loading);
        assert!(state.user.is_none());
        assert!(state.profile.is_none());
        assert_eq!(profiles.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_initialize_loads_existing_session_and_profile() {
        let id = UserId::random();
        let store = Arc::new(MockStore::new());
        store.commit(Some(session_for(id, "u1@cudliy.com")), AuthEvent::SignedIn);
        let profiles = Arc::new(MockProfiles::default());
        profiles.put(id, Some(Segment::DesignerHobbyist));

        let ctx = context(&store, &profiles);
        let state = ctx.settled(1, SETTLE).await.unwrap();
        assert_eq!(state.user.as_ref().map(|u| u.id), Some(id));
        assert_eq!(state.segment(), Some(Segment::DesignerHobbyist));
    }

    #[tokio::test]
    async fn test_loading_until_initial_fetch_applied() {
        let store = Arc::new(MockStore::new());
        store.set_get_delay(Duration::from_millis(200));
        let profiles = Arc::new(MockProfiles::default());
        let ctx = context(&store, &profiles);

        assert!(ctx.snapshot().loading);
        assert!(ctx.settled(0, Duration::from_millis(20)).await.is_none());
        let state = ctx.settled(0, SETTLE).await.unwrap();
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_sign_in_during_slow_initial_fetch_wins() {
        let id = UserId::random();
        let store = Arc::new(MockStore::new());
        store.set_get_delay(Duration::from_millis(100));
        let profiles = Arc::new(MockProfiles::default());
        profiles.put(id, None);
        let ctx = context(&store, &profiles);

        // The initial fetch has already read "no session" and is stalled.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let seq = store.commit(Some(session_for(id, "u1@cudliy.com")), AuthEvent::SignedIn);

        let state = ctx.settled(seq, SETTLE).await.unwrap();
        assert_eq!(state.user.as_ref().map(|u| u.id), Some(id));
        assert!(state.profile.is_some());
    }

    #[tokio::test]
    async fn test_stale_initial_session_never_reverts_sign_in() {
        let id = UserId::random();
        let store = Arc::new(MockStore::new());
        let profiles = Arc::new(MockProfiles::default());
        let ctx = context(&store, &profiles);
        ctx.settled(0, SETTLE).await.unwrap();

        let session = session_for(id, "u1@cudliy.com");
        let signed_in = store.commit(Some(session.clone()), AuthEvent::SignedIn);
        store.inject(AuthChange {
            seq: 0,
            event: AuthEvent::InitialSession,
            session: None,
        });
        let refreshed = store.commit(Some(session), AuthEvent::TokenRefreshed);
        assert!(refreshed > signed_in);

        let state = ctx.settled(refreshed, SETTLE).await.unwrap();
        assert_eq!(state.user.as_ref().map(|u| u.id), Some(id));
        assert_eq!(state.applied_seq, refreshed);
    }

    #[tokio::test]
    async fn test_refresh_profile_is_idempotent() {
        let id = UserId::random();
        let store = Arc::new(MockStore::new());
        store.commit(Some(session_for(id, "u1@cudliy.com")), AuthEvent::SignedIn);
        let profiles = Arc::new(MockProfiles::default());
        profiles.put(id, None);
        let ctx = context(&store, &profiles);
        ctx.settled(1, SETTLE).await.unwrap();

        profiles.put(id, Some(Segment::PrinterIndividual));
        ctx.refresh_profile().await.unwrap();
        let first = ctx.snapshot();
        ctx.refresh_profile().await.unwrap();
        let second = ctx.snapshot();

        assert_eq!(first.profile, second.profile);
        assert_eq!(first.user, second.user);
        assert_eq!(first.applied_seq, second.applied_seq);
        assert_eq!(second.segment(), Some(Segment::PrinterIndividual));
    }

    #[tokio::test]
    async fn test_sign_out_clears_user_session_and_profile() {
        let id = UserId::random();
        let store = Arc::new(MockStore::new());
        store.commit(Some(session_for(id, "u1@cudliy.com")), AuthEvent::SignedIn);
        let profiles = Arc::new(MockProfiles::default());
        profiles.put(id, Some(Segment::CasualBrowser));
        let ctx = context(&store, &profiles);
        ctx.settled(1, SETTLE).await.unwrap();

        ctx.sign_out().await.unwrap();
        let state = ctx.snapshot();
        assert!(state.user.is_none());
        assert!(state.session.is_none());
        assert!(state.profile.is_none());
        assert_eq!(store.sign_out_calls.load(Ordering::SeqCst), 1);
        assert!(state.applied_seq >= store.latest_seq());
    }

    #[tokio::test]
    async fn test_profile_error_treated_as_missing() {
        let id = UserId::random();
        let store = Arc::new(MockStore::new());
        store.commit(Some(session_for(id, "u1@cudliy.com")), AuthEvent::SignedIn);
        let profiles = Arc::new(MockProfiles::default());
        profiles.fail.store(true, Ordering::SeqCst);

        let ctx = context(&store, &profiles);
        let state = ctx.settled(1, SETTLE).await.unwrap();
        assert!(state.is_authenticated());
        assert!(state.profile.is_none());
        assert!(state.profile_error.is_none());
    }

    #[tokio::test]
    async fn test_profile_error_surfaced() {
        let id = UserId::random();
        let store = Arc::new(MockStore::new());
        store.commit(Some(session_for(id, "u1@cudliy.com")), AuthEvent::SignedIn);
        let profiles = Arc::new(MockProfiles::default());
        profiles.fail.store(true, Ordering::SeqCst);

        let ctx = AuthContext::initialize(
            Arc::clone(&store),
            Arc::clone(&profiles),
            ProfileErrorPolicy::Surface,
        );
        let state = ctx.settled(1, SETTLE).await.unwrap();
        assert!(state.profile.is_none());
        assert_eq!(state.profile_error.as_deref(), Some("profiles unavailable"));

        profiles.fail.store(false, Ordering::SeqCst);
        profiles.put(id, Some(Segment::CasualCustomizer));
        ctx.refresh_profile().await.unwrap();
        assert!(ctx.snapshot().profile_error.is_none());
    }

    #[tokio::test]
    async fn test_session_fetch_failure_settles_signed_out() {
        let store = Arc::new(MockStore::new());
        store.fail_get.store(true, Ordering::SeqCst);
        let profiles = Arc::new(MockProfiles::default());
        let ctx = context(&store, &profiles);

        let state = ctx.settled(0, SETTLE).await.unwrap();
        assert!(!state.loading);
        assert!(!state.is_authenticated());
    }

    #[tokio::test]
    async fn test_dispose_stops_updates() {
        let store = Arc::new(MockStore::new());
        let profiles = Arc::new(MockProfiles::default());
        let ctx = context(&store, &profiles);
        ctx.settled(0, SETTLE).await.unwrap();

        ctx.dispose();
        assert!(ctx.is_disposed());
        store.commit(
            Some(session_for(UserId::random(), "late@cudliy.com")),
            AuthEvent::SignedIn,
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(ctx.snapshot().user.is_none());
        assert!(matches!(
            ctx.refresh_profile().await,
            Err(AuthContextError::Disposed)
        ));
        assert!(ctx.settled(1, Duration::from_millis(20)).await.is_none());
    }

    #[test]
    fn test_profile_error_policy_parse() {
        assert_eq!(
            "treat-as-missing".parse::<ProfileErrorPolicy>().unwrap(),
            ProfileErrorPolicy::TreatAsMissing
        );
        assert_eq!(
            " Surface ".parse::<ProfileErrorPolicy>().unwrap(),
            ProfileErrorPolicy::Surface
        );
        assert!("ignore".parse::<ProfileErrorPolicy>().is_err());
    }
}
