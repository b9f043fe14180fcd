//! Segment selection.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use cudliy_core::{Segment, SegmentError, SegmentGroup};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::{GroupView, busy_notice};
use crate::auth::SessionStore;
use crate::error::add_breadcrumb;
use crate::middleware::RequireAuth;
use crate::models::{Notice, push_notice, take_notice};
use crate::state::AppState;

/// Onboarding form data. The field is absent when no radio was picked.
#[derive(Debug, Default, Deserialize)]
pub struct OnboardingForm {
    #[serde(default)]
    pub segment: String,
}

/// Onboarding page template.
#[derive(Template, WebTemplate)]
#[template(path = "onboarding.html")]
pub struct OnboardingTemplate {
    pub signed_in: bool,
    pub notice: Option<Notice>,
    pub groups: Vec<GroupView>,
    pub current: String,
}

/// Display the segment choices.
pub async fn show(RequireAuth { auth, .. }: RequireAuth, session: Session) -> impl IntoResponse {
    OnboardingTemplate {
        signed_in: true,
        notice: take_notice(&session).await,
        groups: SegmentGroup::ALL.into_iter().map(GroupView::from).collect(),
        current: auth
            .segment()
            .map(|segment| segment.as_str().to_string())
            .unwrap_or_default(),
    }
}

/// Save the chosen segment, reload the profile and continue to the dashboard.
#[instrument(skip_all)]
pub async fn save(
    State(state): State<AppState>,
    RequireAuth { visitor, auth }: RequireAuth,
    session: Session,
    Form(form): Form<OnboardingForm>,
) -> Response {
    let segment = match Segment::parse(&form.segment) {
        Ok(segment) => segment,
        Err(e) => {
            if let SegmentError::Unknown(value) = &e {
                tracing::warn!(%value, "rejected unknown segment");
            }
            push_notice(
                &session,
                Notice::error("Choose one", "Please select a role to continue."),
            )
            .await;
            return Redirect::to("/onboarding").into_response();
        }
    };

    let Some(_submitting) = visitor.begin_submission() else {
        push_notice(&session, busy_notice()).await;
        return Redirect::to("/onboarding").into_response();
    };

    // The write needs a live token; the store refreshes it if it is close to expiry.
    let current = match visitor.store().get_session().await {
        Ok(stamped) => stamped.value,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read session for onboarding");
            None
        }
    };
    let Some(auth_session) = current else {
        return Redirect::to("/login").into_response();
    };

    // Registration may have failed to create the row; the update below
    // would then match nothing.
    if auth.profile.is_none() && auth.profile_error.is_none() {
        let user = auth_session.user();
        if let Err(e) = state
            .supabase()
            .insert_profile(
                Some(&auth_session),
                user.id,
                user.user_metadata.full_name.as_deref(),
            )
            .await
        {
            if !e.is_unique_violation() {
                tracing::warn!(error = %e, "failed to create missing profile row");
            }
        }
    }

    if let Err(e) = state.supabase().update_segment(&auth_session, segment).await {
        tracing::warn!(error = %e, %segment, "failed to save segment");
        push_notice(&session, Notice::error("Could not save", e.user_message())).await;
        return Redirect::to("/onboarding").into_response();
    }

    if let Err(e) = visitor.auth().refresh_profile().await {
        tracing::warn!(error = %e, "profile refresh after onboarding failed");
    }
    add_breadcrumb("onboarding", "Segment saved", None);
    tracing::info!(%segment, "onboarding complete");
    Redirect::to("/dashboard").into_response()
}
