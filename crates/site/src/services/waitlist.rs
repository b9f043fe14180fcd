//! Waitlist submission.
//!
//! One submission flow serves both form layouts. The order is fixed:
//! validate, check for an existing row, insert. A failed duplicate check is
//! reported on its own and never falls through to the insert; a unique
//! violation on insert (a concurrent submission won) counts as already
//! registered.

use std::future::Future;
use std::str::FromStr;

use cudliy_core::{WaitlistEntry, WaitlistInput, WaitlistRole, WaitlistValidationError};
use thiserror::Error;
use tracing::instrument;

use crate::models::Notice;
use crate::supabase::{SupabaseClient, SupabaseError};

/// Waitlist form layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WaitlistPresentation {
    /// Two-column page with a designer/maker role picker; a role is required.
    #[default]
    Split,
    /// Compact card with name and email only.
    Card,
}

impl WaitlistPresentation {
    #[must_use]
    pub const fn requires_role(self) -> bool {
        matches!(self, Self::Split)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Split => "split",
            Self::Card => "card",
        }
    }
}

impl FromStr for WaitlistPresentation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "split" => Ok(Self::Split),
            "card" => Ok(Self::Card),
            other => Err(format!("expected split or card, got '{other}'")),
        }
    }
}

/// The `waitlist` table.
pub trait WaitlistTable: Send + Sync {
    /// Whether a row exists for `email`, scoped to `role` when given.
    fn contains(
        &self,
        email: &str,
        role: Option<WaitlistRole>,
    ) -> impl Future<Output = Result<bool, SupabaseError>> + Send;

    fn insert(&self, entry: &WaitlistEntry) -> impl Future<Output = Result<(), SupabaseError>> + Send;
}

impl WaitlistTable for SupabaseClient {
    fn contains(
        &self,
        email: &str,
        role: Option<WaitlistRole>,
    ) -> impl Future<Output = Result<bool, SupabaseError>> + Send {
        self.waitlist_contains(email, role)
    }

    fn insert(&self, entry: &WaitlistEntry) -> impl Future<Output = Result<(), SupabaseError>> + Send {
        self.insert_waitlist(entry)
    }
}

/// A submission that reached the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitlistOutcome {
    Joined(Option<WaitlistRole>),
    AlreadyRegistered(Option<WaitlistRole>),
}

impl WaitlistOutcome {
    #[must_use]
    pub fn notice(self) -> Notice {
        match self {
            Self::Joined(Some(role)) => Notice::info(
                "Success!",
                format!("Welcome to the {role} waitlist! We'll be in touch soon."),
            ),
            Self::Joined(None) => Notice::info(
                "Welcome to the waitlist! 🎉",
                "We'll notify you when we're ready to bring your ideas to life.",
            ),
            Self::AlreadyRegistered(Some(role)) => Notice::error(
                "Already Registered",
                format!("This email is already registered as a {role}."),
            ),
            Self::AlreadyRegistered(None) => Notice::info(
                "Already on the list!",
                "This email is already registered for our waitlist.",
            ),
        }
    }
}

/// A submission that did not get through.
#[derive(Debug, Error)]
pub enum WaitlistError {
    /// Rejected before any network call.
    #[error(transparent)]
    Invalid(#[from] WaitlistValidationError),

    /// The duplicate check failed.
    #[error("waitlist lookup failed: {0}")]
    Check(#[source] SupabaseError),

    /// The insert failed for a reason other than a duplicate.
    #[error("waitlist insert failed: {0}")]
    Insert(#[source] SupabaseError),
}

impl WaitlistError {
    #[must_use]
    pub fn notice(&self) -> Notice {
        match self {
            Self::Invalid(e) => Notice::error("Error", e.to_string()),
            Self::Check(_) => Notice::error("Error", "Something went wrong. Please try again."),
            Self::Insert(_) => Notice::error("Error", "Failed to join waitlist. Please try again."),
        }
    }
}

/// Waitlist submission flow.
#[derive(Debug, Clone)]
pub struct WaitlistService<T = SupabaseClient> {
    table: T,
    presentation: WaitlistPresentation,
}

impl<T: WaitlistTable> WaitlistService<T> {
    #[must_use]
    pub const fn new(table: T, presentation: WaitlistPresentation) -> Self {
        Self {
            table,
            presentation,
        }
    }

    #[must_use]
    pub const fn presentation(&self) -> WaitlistPresentation {
        self.presentation
    }

    /// Validate and store a submission.
    ///
    /// # Errors
    ///
    /// Returns [`WaitlistError::Invalid`] without touching the backend when
    /// a field is missing, [`WaitlistError::Check`] when the duplicate check
    /// fails, and [`WaitlistError::Insert`] when the insert fails.
    #[instrument(skip_all, fields(presentation = self.presentation.as_str()))]
    pub async fn submit(&self, input: &WaitlistInput) -> Result<WaitlistOutcome, WaitlistError> {
        let entry = WaitlistEntry::validate(input, self.presentation.requires_role())?;
        let role = entry.role;

        let exists = self
            .table
            .contains(entry.email.as_str(), role)
            .await
            .map_err(|e| {
                if e.is_network() {
                    tracing::error!(error = %e, "waitlist lookup could not reach the backend");
                } else {
                    tracing::error!(error = %e, "waitlist lookup rejected");
                }
                WaitlistError::Check(e)
            })?;
        if exists {
            tracing::info!(?role, "waitlist email already registered");
            return Ok(WaitlistOutcome::AlreadyRegistered(role));
        }

        match self.table.insert(&entry).await {
            Ok(()) => {
                tracing::info!(?role, "waitlist entry created");
                Ok(WaitlistOutcome::Joined(role))
            }
            Err(e) if e.is_unique_violation() => {
                tracing::info!(?role, "waitlist insert hit unique constraint");
                Ok(WaitlistOutcome::AlreadyRegistered(role))
            }
            Err(e) => {
                tracing::error!(error = %e, "waitlist insert failed");
                Err(WaitlistError::Insert(e))
            }
        }
    }
}
