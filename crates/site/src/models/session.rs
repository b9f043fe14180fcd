//! Session-related types.
//!
//! The cookie session holds only the visitor id and a pending notice; auth
//! tokens stay server-side with the visitor's session store.

use serde::{Deserialize, Serialize};
use tower_sessions::Session;

/// Notice styling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeVariant {
    #[default]
    Default,
    Destructive,
}

/// A dismissable message shown once on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub variant: NoticeVariant,
}

impl Notice {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NoticeVariant::Default,
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NoticeVariant::Destructive,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.variant == NoticeVariant::Destructive
    }
}

/// Session keys.
pub mod keys {
    /// Key for the visitor registry id.
    pub const VISITOR_ID: &str = "visitor_id";

    /// Key for the notice to show on the next page.
    pub const NOTICE: &str = "notice";

    /// Key for waitlist input to re-populate the form after a rejection.
    pub const WAITLIST_FORM: &str = "waitlist_form";
}

/// Queue a notice for the next rendered page.
///
/// Failing to store it only loses the message, so errors are logged.
pub async fn push_notice(session: &Session, notice: Notice) {
    if let Err(e) = session.insert(keys::NOTICE, notice).await {
        tracing::warn!(error = %e, "failed to store notice in session");
    }
}

/// Take the pending notice, if any.
pub async fn take_notice(session: &Session) -> Option<Notice> {
    session
        .remove::<Notice>(keys::NOTICE)
        .await
        .ok()
        .flatten()
}
