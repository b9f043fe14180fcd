//! Per-visitor session store backed by Supabase GoTrue.
//!
//! Holds the visitor's session in memory (the server-side stand-in for the
//! browser storage a client SDK would use) and broadcasts every change.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::instrument;

use super::{AuthChange, AuthEvent, SessionStore, Stamped, Subscription};
use crate::supabase::{AuthSession, SignUpOutcome, SupabaseClient, SupabaseError};

/// Capacity of the change broadcast. Each store has a single subscriber
/// (its auth context) that drains promptly.
const EVENT_BUFFER: usize = 16;

#[derive(Debug, Default)]
struct StoreState {
    session: Option<AuthSession>,
    seq: u64,
}

/// A visitor's GoTrue session.
#[derive(Debug)]
pub struct SupabaseSessionStore {
    client: SupabaseClient,
    state: Mutex<StoreState>,
    events: broadcast::Sender<AuthChange>,
    refresh: tokio::sync::Mutex<()>,
}

impl SupabaseSessionStore {
    #[must_use]
    pub fn new(client: SupabaseClient) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            client,
            state: Mutex::new(StoreState::default()),
            events,
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the session and announce it. Returns the previous session and
    /// the new sequence number.
    fn commit(&self, session: Option<AuthSession>, event: AuthEvent) -> (Option<AuthSession>, u64) {
        let mut state = self.lock();
        self.commit_locked(&mut state, session, event)
    }

    /// Commit only if nothing else changed since `expected_seq`.
    fn commit_if(&self, expected_seq: u64, session: Option<AuthSession>, event: AuthEvent) -> Option<u64> {
        let mut state = self.lock();
        if state.seq != expected_seq {
            return None;
        }
        Some(self.commit_locked(&mut state, session, event).1)
    }

    fn commit_locked(
        &self,
        state: &mut StoreState,
        session: Option<AuthSession>,
        event: AuthEvent,
    ) -> (Option<AuthSession>, u64) {
        state.seq += 1;
        let previous = std::mem::replace(&mut state.session, session.clone());
        let seq = state.seq;
        // No receivers is fine: nobody is listening yet.
        let _ = self.events.send(AuthChange {
            seq,
            event,
            session,
        });
        tracing::debug!(seq, %event, "auth state change");
        (previous, seq)
    }

    fn snapshot(&self) -> Stamped<Option<AuthSession>> {
        let state = self.lock();
        Stamped {
            seq: state.seq,
            value: state.session.clone(),
        }
    }

    /// Sign in with email and password and make the result the current session.
    ///
    /// # Errors
    ///
    /// Returns the GoTrue error; the current session is left untouched.
    #[instrument(skip(self, password))]
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Stamped<AuthSession>, SupabaseError> {
        let session = self.client.sign_in_with_password(email, password).await?;
        let (_, seq) = self.commit(Some(session.clone()), AuthEvent::SignedIn);
        Ok(Stamped {
            seq,
            value: session,
        })
    }

    /// Create an account; if GoTrue signs the user in immediately, that
    /// session becomes current.
    ///
    /// # Errors
    ///
    /// Returns the GoTrue error; the current session is left untouched.
    #[instrument(skip(self, password, full_name))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<SignUpOutcome, SupabaseError> {
        let outcome = self.client.sign_up(email, password, full_name).await?;
        if let SignUpOutcome::SignedIn(session) = &outcome {
            self.commit(Some(session.clone()), AuthEvent::SignedIn);
        }
        Ok(outcome)
    }
}

impl SessionStore for SupabaseSessionStore {
    async fn get_session(&self) -> Result<Stamped<Option<AuthSession>>, SupabaseError> {
        let current = self.snapshot();
        match &current.value {
            Some(session) if session.is_expired(Utc::now()) => {}
            _ => return Ok(current),
        }

        // One refresh at a time; a refresh token is single-use.
        let _refreshing = self.refresh.lock().await;
        let current = self.snapshot();
        let Some(session) = current.value.clone() else {
            return Ok(current);
        };
        if !session.is_expired(Utc::now()) {
            return Ok(current);
        }

        match self.client.refresh_session(&session).await {
            Ok(fresh) => {
                let seq = self.commit_if(current.seq, Some(fresh), AuthEvent::TokenRefreshed);
                if seq.is_none() {
                    tracing::debug!("session changed during refresh, keeping newer state");
                }
                Ok(self.snapshot())
            }
            Err(e @ SupabaseError::Api { .. }) => {
                tracing::warn!(error = %e, "refresh token rejected, signing out");
                self.commit_if(current.seq, None, AuthEvent::SignedOut);
                Ok(self.snapshot())
            }
            Err(e) => Err(e),
        }
    }

    fn on_auth_state_change(&self) -> Subscription {
        // Subscribe under the lock so no change slips between the snapshot
        // and the registration.
        let state = self.lock();
        let receiver = self.events.subscribe();
        Subscription::new(
            AuthChange {
                seq: state.seq,
                event: AuthEvent::InitialSession,
                session: state.session.clone(),
            },
            receiver,
        )
    }

    async fn sign_out(&self) -> Stamped<Result<(), SupabaseError>> {
        let (previous, seq) = self.commit(None, AuthEvent::SignedOut);
        let value = match previous {
            Some(session) => self.client.sign_out(&session).await,
            None => Ok(()),
        };
        Stamped { seq, value }
    }

    fn latest_seq(&self) -> u64 {
        self.lock().seq
    }
}
