//! Route guards.
//!
//! Both gates are pure functions of a [`GateInput`]: they hold no state and
//! make no calls. The request-level plumbing (waiting for the auth context
//! to settle, turning a decision into a response) lives in
//! `middleware::auth`.

use super::AuthState;

/// Login destination used when none is configured.
pub const LOGIN_PATH: &str = "/login";
/// Where authenticated visitors without a segment are sent.
pub const ONBOARDING_PATH: &str = "/onboarding";

/// The only facts a gate may look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateInput {
    pub loading: bool,
    pub authenticated: bool,
    pub segment_set: bool,
    /// The profile could not be read (only under the `surface` policy).
    pub profile_unavailable: bool,
}

impl GateInput {
    #[must_use]
    pub fn from_state(state: &AuthState) -> Self {
        Self {
            loading: state.loading,
            authenticated: state.is_authenticated(),
            segment_set: state.segment().is_some(),
            profile_unavailable: state.profile_error.is_some(),
        }
    }
}

/// What a guarded route should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Auth state not known yet; render the loading page, no redirect.
    Loading,
    /// Send the visitor elsewhere, replacing the history entry.
    Redirect(String),
    /// The profile could not be loaded; render the unavailable page.
    Unavailable,
    /// Render the protected page.
    Allow,
}

/// Requires a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGate {
    login_path: String,
}

impl Default for AuthGate {
    fn default() -> Self {
        Self {
            login_path: LOGIN_PATH.to_string(),
        }
    }
}

impl AuthGate {
    /// Redirect unauthenticated visitors to `path` instead of `/login`.
    #[must_use]
    pub fn with_login_path(path: impl Into<String>) -> Self {
        Self {
            login_path: path.into(),
        }
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    #[must_use]
    pub fn decide(&self, input: GateInput) -> GateDecision {
        if input.loading {
            GateDecision::Loading
        } else if !input.authenticated {
            GateDecision::Redirect(self.login_path.clone())
        } else {
            GateDecision::Allow
        }
    }
}

/// Requires a signed-in user who has completed onboarding.
///
/// Authentication is checked first: a signed-out visitor always goes to
/// `/login`, never to onboarding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentGate;

impl SegmentGate {
    #[must_use]
    pub fn decide(self, input: GateInput) -> GateDecision {
        if input.loading {
            return GateDecision::Loading;
        }
        if !input.authenticated {
            return GateDecision::Redirect(LOGIN_PATH.to_string());
        }
        if input.segment_set {
            return GateDecision::Allow;
        }
        if input.profile_unavailable {
            GateDecision::Unavailable
        } else {
            GateDecision::Redirect(ONBOARDING_PATH.to_string())
        }
    }
}
