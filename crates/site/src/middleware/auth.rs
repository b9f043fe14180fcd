//! Visitor and guard extractors.
//!
//! [`CurrentVisitor`] resolves the cookie session to the visitor's registry
//! entry, creating it on first contact. [`KnownVisitor`] only looks it up.
//! [`RequireAuth`] and [`RequireSegment`] wait (briefly) for a known
//! visitor's auth context to catch up with its session store, then apply the
//! matching gate.

use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use cudliy_core::VisitorId;
use tower_sessions::Session;

use crate::auth::{AuthGate, AuthState, GateDecision, GateInput, LOGIN_PATH, SegmentGate};
use crate::error::{AppError, set_sentry_user};
use crate::middleware::request_id::RequestId;
use crate::models::session_keys;
use crate::services::Visitor;
use crate::state::AppState;

fn request_session(parts: &Parts) -> Result<Session, AppError> {
    parts
        .extensions
        .get::<Session>()
        .cloned()
        .ok_or_else(|| AppError::Internal("session layer missing".to_string()))
}

/// The visitor behind this request, created on first contact.
///
/// Only the form posts that need a session store of their own (sign-in,
/// registration, waitlist) use this; pages use [`KnownVisitor`].
#[derive(Clone)]
pub struct CurrentVisitor(pub Arc<Visitor>);

impl FromRequestParts<AppState> for CurrentVisitor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = request_session(parts)?;
        let stored = session.get::<VisitorId>(session_keys::VISITOR_ID).await?;

        let id = match stored {
            Some(id) => id,
            None => {
                let id = VisitorId::random();
                session.insert(session_keys::VISITOR_ID, id).await?;
                id
            }
        };

        tracing::Span::current().record("visitor_id", tracing::field::display(id));
        Ok(Self(state.visitors().get_or_create(id).await))
    }
}

/// The visitor behind this request, if its session names one still in the
/// registry. Never writes the session or creates a visitor.
#[derive(Clone)]
pub struct KnownVisitor(pub Option<Arc<Visitor>>);

impl KnownVisitor {
    /// Whether the page chrome should show the signed-in navigation.
    #[must_use]
    pub fn signed_in(&self) -> bool {
        self.0
            .as_ref()
            .is_some_and(|visitor| visitor.auth().snapshot().is_authenticated())
    }
}

impl FromRequestParts<AppState> for KnownVisitor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = request_session(parts)?;
        let Some(id) = session.get::<VisitorId>(session_keys::VISITOR_ID).await? else {
            return Ok(Self(None));
        };

        tracing::Span::current().record("visitor_id", tracing::field::display(id));
        Ok(Self(state.visitors().get(id).await))
    }
}

/// Wait for the visitor's auth context to apply every change its store has
/// made, up to the configured timeout. On timeout the current (possibly
/// still loading) snapshot is returned.
pub async fn settled_state(visitor: &Visitor, state: &AppState) -> AuthState {
    let target = visitor.latest_seq();
    match visitor
        .auth()
        .settled(target, state.config().auth_settle_timeout)
        .await
    {
        Some(settled) => settled,
        None => {
            tracing::debug!(target_seq = target, "auth state not settled in time");
            let mut snapshot = visitor.auth().snapshot();
            // Not caught up counts as loading: never redirect on stale state.
            snapshot.loading = true;
            snapshot
        }
    }
}

/// "Checking your session" page; reloads itself.
#[derive(Template, WebTemplate)]
#[template(path = "loading.html")]
pub struct LoadingTemplate {
    pub signed_in: bool,
    pub retry_path: String,
}

/// Shown when the profile could not be loaded under the `surface` policy.
#[derive(Template, WebTemplate)]
#[template(path = "unavailable.html")]
pub struct UnavailableTemplate {
    pub signed_in: bool,
    pub message: String,
    pub request_id: String,
}

/// A guard that did not allow the request.
pub enum GuardRejection {
    Loading { retry_path: String },
    Redirect(String),
    Unavailable { message: String, request_id: String },
    Error(AppError),
}

impl IntoResponse for GuardRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Loading { retry_path } => LoadingTemplate {
                signed_in: false,
                retry_path,
            }
            .into_response(),
            // 303 so the gated URL is replaced, not stacked, in history.
            Self::Redirect(to) => Redirect::to(&to).into_response(),
            Self::Unavailable {
                message,
                request_id,
            } => (
                StatusCode::SERVICE_UNAVAILABLE,
                UnavailableTemplate {
                    signed_in: true,
                    message,
                    request_id,
                },
            )
                .into_response(),
            Self::Error(e) => e.into_response(),
        }
    }
}

impl From<AppError> for GuardRejection {
    fn from(e: AppError) -> Self {
        Self::Error(e)
    }
}

/// Turn a gate decision into extractor output.
fn enforce(
    parts: &Parts,
    decision: GateDecision,
    auth: &AuthState,
) -> Result<(), GuardRejection> {
    match decision {
        GateDecision::Allow => {
            if let Some(user) = &auth.user {
                set_sentry_user(&user.id, user.email.as_deref());
            }
            Ok(())
        }
        GateDecision::Loading => Err(GuardRejection::Loading {
            retry_path: parts
                .uri
                .path_and_query()
                .map_or_else(|| parts.uri.path().to_string(), ToString::to_string),
        }),
        GateDecision::Redirect(to) => {
            tracing::debug!(from = %parts.uri.path(), %to, "guard redirect");
            Err(GuardRejection::Redirect(to))
        }
        GateDecision::Unavailable => {
            let request_id = parts
                .extensions
                .get::<RequestId>()
                .map(|RequestId(id)| id.clone())
                .unwrap_or_default();
            Err(GuardRejection::Unavailable {
                message: auth
                    .profile_error
                    .clone()
                    .unwrap_or_else(|| "Your profile could not be loaded.".to_string()),
                request_id,
            })
        }
    }
}

/// Settle the known visitor's auth state and apply a gate. A request with
/// no visitor is signed out.
async fn gated(
    parts: &mut Parts,
    state: &AppState,
    decide: impl FnOnce(GateInput) -> GateDecision,
) -> Result<(Arc<Visitor>, AuthState), GuardRejection> {
    let KnownVisitor(visitor) = KnownVisitor::from_request_parts(parts, state).await?;

    let auth = match &visitor {
        Some(visitor) => settled_state(visitor, state).await,
        None => AuthState::default(),
    };
    enforce(parts, decide(GateInput::from_state(&auth)), &auth)?;

    // Allowed means signed in, and signing in always creates the visitor.
    visitor
        .map(|visitor| (visitor, auth))
        .ok_or_else(|| GuardRejection::Redirect(LOGIN_PATH.to_string()))
}

/// Requires a signed-in visitor.
pub struct RequireAuth {
    pub visitor: Arc<Visitor>,
    pub auth: AuthState,
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = GuardRejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let (visitor, auth) = gated(parts, state, |input| AuthGate::default().decide(input)).await?;
        Ok(Self { visitor, auth })
    }
}

/// Requires a signed-in visitor who has chosen a segment.
pub struct RequireSegment {
    pub visitor: Arc<Visitor>,
    pub auth: AuthState,
}

impl FromRequestParts<AppState> for RequireSegment {
    type Rejection = GuardRejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let (visitor, auth) = gated(parts, state, |input| SegmentGate.decide(input)).await?;
        Ok(Self { visitor, auth })
    }
}
