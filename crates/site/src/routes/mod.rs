//! HTTP route handlers for the marketing site.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Landing page (countdown + waitlist)
//! GET  /countdown              - Countdown values (JSON)
//! POST /waitlist               - Join the waitlist
//!
//! # Auth
//! GET  /login                  - Login page
//! POST /login                  - Login action
//! GET  /register               - Register page
//! POST /register               - Register action
//! POST /logout                 - Sign out
//!
//! # Gated
//! GET  /onboarding             - Segment selection (signed in)
//! POST /onboarding             - Save segment (signed in)
//! GET  /dashboard              - Dashboard (signed in, segment chosen)
//! ```

pub mod auth;
pub mod dashboard;
pub mod home;
pub mod onboarding;

use axum::{
    Router,
    routing::{get, post},
};
use cudliy_core::{Segment, SegmentGroup};

use crate::middleware::{credentials_rate_limiter, waitlist_rate_limiter};
use crate::models::Notice;
use crate::state::AppState;

/// Notice for a second submission while the first is still in flight.
pub(crate) fn busy_notice() -> Notice {
    Notice::error(
        "Please wait",
        "Your previous submission is still being processed.",
    )
}

/// A segment group as rendered on the login and onboarding pages.
pub struct GroupView {
    pub title: &'static str,
    pub blurb: &'static str,
    pub options: Vec<SegmentOption>,
}

/// One selectable segment.
pub struct SegmentOption {
    pub value: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

impl From<SegmentGroup> for GroupView {
    fn from(group: SegmentGroup) -> Self {
        Self {
            title: group.title(),
            blurb: group.blurb(),
            options: group.segments().into_iter().map(SegmentOption::from).collect(),
        }
    }
}

impl From<Segment> for SegmentOption {
    fn from(segment: Segment) -> Self {
        Self {
            value: segment.as_str(),
            title: segment.title(),
            description: segment.description(),
        }
    }
}

/// Create all routes for the site.
///
/// With `rate_limit` set, credential and waitlist submissions are throttled
/// per client IP.
pub fn routes(rate_limit: bool) -> Router<AppState> {
    let mut login = post(auth::login);
    let mut register = post(auth::register);
    let mut waitlist = post(home::join_waitlist);
    if rate_limit {
        login = login.layer(credentials_rate_limiter());
        register = register.layer(credentials_rate_limiter());
        waitlist = waitlist.layer(waitlist_rate_limiter());
    }

    Router::new()
        .route("/", get(home::home))
        .route("/countdown", get(home::countdown))
        .route("/waitlist", waitlist)
        .route("/login", get(auth::login_page).merge(login))
        .route("/register", get(auth::register_page).merge(register))
        .route("/logout", post(auth::logout))
        .route(
            "/onboarding",
            get(onboarding::show).post(onboarding::save),
        )
        .route("/dashboard", get(dashboard::show))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_view_lists_both_segments() {
        let view = GroupView::from(SegmentGroup::ALL[0]);
        assert_eq!(view.options.len(), 2);
        assert_eq!(view.options[0].value, "casual_browser");
        assert_eq!(view.options[1].title, "Light Customizer");
    }
}
