//! Sign-in, registration and sign-out.
//!
//! Credentials go straight to GoTrue through the visitor's session store;
//! nothing but the visitor id is kept in the cookie session.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use cudliy_core::{SegmentGroup, UserId};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::{GroupView, busy_notice};
use crate::auth::AuthContextError;
use crate::error::{add_breadcrumb, clear_sentry_user};
use crate::middleware::{CurrentVisitor, KnownVisitor};
use crate::models::{Notice, push_notice, take_notice};
use crate::state::AppState;
use crate::supabase::SignUpOutcome;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub signed_in: bool,
    pub notice: Option<Notice>,
    pub groups: Vec<GroupView>,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub signed_in: bool,
    pub notice: Option<Notice>,
}

// =============================================================================
// Login
// =============================================================================

/// Display the login page.
pub async fn login_page(visitor: KnownVisitor, session: Session) -> impl IntoResponse {
    LoginTemplate {
        signed_in: visitor.signed_in(),
        notice: take_notice(&session).await,
        groups: SegmentGroup::ALL.into_iter().map(GroupView::from).collect(),
    }
}

/// Handle login form submission.
#[instrument(skip_all)]
pub async fn login(
    CurrentVisitor(visitor): CurrentVisitor,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let Some(_submitting) = visitor.begin_submission() else {
        push_notice(&session, busy_notice()).await;
        return Redirect::to("/login").into_response();
    };

    match visitor
        .store()
        .sign_in_with_password(form.email.trim(), &form.password)
        .await
    {
        Ok(signed_in) => {
            tracing::info!(user_id = %signed_in.value.user().id, seq = signed_in.seq, "signed in");
            // New privilege level, new session id.
            if let Err(e) = session.cycle_id().await {
                tracing::warn!(error = %e, "failed to rotate session id");
            }
            add_breadcrumb("auth", "Signed in", None);
            Redirect::to("/dashboard").into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "login failed");
            push_notice(&session, Notice::error("Login failed", e.user_message())).await;
            Redirect::to("/login").into_response()
        }
    }
}

// =============================================================================
// Registration
// =============================================================================

/// Display the registration page.
pub async fn register_page(visitor: KnownVisitor, session: Session) -> impl IntoResponse {
    RegisterTemplate {
        signed_in: visitor.signed_in(),
        notice: take_notice(&session).await,
    }
}

/// Handle registration: create the account, then its profile row.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    CurrentVisitor(visitor): CurrentVisitor,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Response {
    let full_name = form.full_name.trim();
    let email = form.email.trim();
    if full_name.is_empty() || email.is_empty() || form.password.is_empty() {
        push_notice(
            &session,
            Notice::error("Sign up failed", "Please fill in all fields."),
        )
        .await;
        return Redirect::to("/register").into_response();
    }

    let Some(_submitting) = visitor.begin_submission() else {
        push_notice(&session, busy_notice()).await;
        return Redirect::to("/register").into_response();
    };

    let outcome = match visitor
        .store()
        .sign_up(email, &form.password, Some(full_name))
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(error = %e, "sign up failed");
            push_notice(&session, Notice::error("Sign up failed", e.user_message())).await;
            return Redirect::to("/register").into_response();
        }
    };

    let user_id: UserId = outcome.user().id;
    let session_for_insert = match &outcome {
        SignUpOutcome::SignedIn(auth_session) => Some(auth_session),
        SignUpOutcome::ConfirmationRequired(_) => None,
    };
    if let Err(e) = state
        .supabase()
        .insert_profile(session_for_insert, user_id, Some(full_name))
        .await
    {
        // The account exists; onboarding works without the row until the
        // segment is saved, so this is not fatal.
        tracing::warn!(error = %e, %user_id, "failed to create profile row");
    }

    add_breadcrumb("auth", "Registered", None);
    match outcome {
        SignUpOutcome::SignedIn(_) => {
            if let Err(e) = session.cycle_id().await {
                tracing::warn!(error = %e, "failed to rotate session id");
            }
            push_notice(
                &session,
                Notice::info("Account created", "Welcome! Let's personalize your experience."),
            )
            .await;
            Redirect::to("/onboarding").into_response()
        }
        SignUpOutcome::ConfirmationRequired(_) => {
            push_notice(
                &session,
                Notice::info(
                    "Account created",
                    "Check your email to confirm your address, then sign in.",
                ),
            )
            .await;
            Redirect::to("/login").into_response()
        }
    }
}

// =============================================================================
// Sign-out
// =============================================================================

/// Sign out and return to the login page.
#[instrument(skip_all)]
pub async fn logout(KnownVisitor(visitor): KnownVisitor, session: Session) -> Response {
    // No visitor means nothing was ever signed in.
    if let Some(visitor) = visitor {
        match visitor.auth().sign_out().await {
            Ok(()) => {}
            // Local state is already cleared; only the server-side revoke failed.
            Err(AuthContextError::SignOut(e)) => {
                tracing::warn!(error = %e, "session revoke failed");
            }
            Err(AuthContextError::Disposed) => {
                tracing::warn!("sign out on a disposed auth context");
            }
        }
    }
    clear_sentry_user();
    if let Err(e) = session.cycle_id().await {
        tracing::warn!(error = %e, "failed to rotate session id");
    }
    Redirect::to("/login").into_response()
}
