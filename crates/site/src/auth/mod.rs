//! Role-segmentation access control.
//!
//! Three pieces cooperate to decide what a visitor may see:
//!
//! - a [`SessionStore`] owns the visitor's credentials and announces every
//!   change as a sequence-stamped [`AuthChange`];
//! - an [`AuthContext`] folds those changes (plus the profile row) into a
//!   single [`AuthState`] through one serialized update queue;
//! - the [`AuthGate`] and [`SegmentGate`] turn a state snapshot into a
//!   render / redirect / loading decision.
//!
//! # Ordering
//!
//! Every store mutation bumps a per-store sequence number. The context
//! records the sequence of the last change it applied and ignores anything
//! older, so a late `InitialSession` can never overwrite a newer sign-in.
//! Guards compare the applied sequence with [`SessionStore::latest_seq`] to
//! know when the context has caught up.

pub mod context;
pub mod guard;
pub mod store;

use std::future::Future;

use cudliy_core::Profile;
use tokio::sync::broadcast;

use crate::supabase::{AuthSession, SupabaseClient, SupabaseError};

pub use context::{AuthContext, AuthContextError, AuthState, ProfileErrorPolicy};
pub use guard::{AuthGate, GateDecision, GateInput, LOGIN_PATH, SegmentGate};
pub use store::SupabaseSessionStore;

/// Kind of auth state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// Delivered once to each new subscriber with the session at that moment.
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

impl AuthEvent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InitialSession => "INITIAL_SESSION",
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
        }
    }
}

impl std::fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An auth state change, stamped with the store sequence it produced.
#[derive(Debug, Clone)]
pub struct AuthChange {
    pub seq: u64,
    pub event: AuthEvent,
    pub session: Option<AuthSession>,
}

/// A value paired with the store sequence at which it was observed.
#[derive(Debug, Clone)]
pub struct Stamped<T> {
    pub seq: u64,
    pub value: T,
}

/// A registration for auth state changes.
///
/// Yields the `InitialSession` snapshot first, then every later change in
/// the order the store made them. Dropping it unregisters.
#[derive(Debug)]
pub struct Subscription {
    initial: Option<AuthChange>,
    receiver: broadcast::Receiver<AuthChange>,
}

impl Subscription {
    #[must_use]
    pub const fn new(initial: AuthChange, receiver: broadcast::Receiver<AuthChange>) -> Self {
        Self {
            initial: Some(initial),
            receiver,
        }
    }

    /// Wait for the next change.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged` if changes were dropped because the
    /// subscriber fell behind, and `RecvError::Closed` once the store is gone.
    pub async fn recv(&mut self) -> Result<AuthChange, broadcast::error::RecvError> {
        if let Some(initial) = self.initial.take() {
            return Ok(initial);
        }
        self.receiver.recv().await
    }
}

/// Owner of a visitor's credentials and session tokens.
pub trait SessionStore: Send + Sync + 'static {
    /// The current session, refreshed first if it has expired.
    fn get_session(
        &self,
    ) -> impl Future<Output = Result<Stamped<Option<AuthSession>>, SupabaseError>> + Send;

    /// Register for auth state changes.
    fn on_auth_state_change(&self) -> Subscription;

    /// End the session. The local session is cleared even if revoking it
    /// server-side fails; the stamp is the sequence of the sign-out change.
    fn sign_out(&self) -> impl Future<Output = Stamped<Result<(), SupabaseError>>> + Send;

    /// Sequence number of the most recent change.
    fn latest_seq(&self) -> u64;
}

/// Where profile rows come from.
pub trait ProfileSource: Send + Sync + 'static {
    /// Fetch the profile of the session's user; `None` when no row exists.
    fn fetch_profile(
        &self,
        session: &AuthSession,
    ) -> impl Future<Output = Result<Option<Profile>, SupabaseError>> + Send;
}

impl ProfileSource for SupabaseClient {
    fn fetch_profile(
        &self,
        session: &AuthSession,
    ) -> impl Future<Output = Result<Option<Profile>, SupabaseError>> + Send {
        self.get_profile(session)
    }
}
