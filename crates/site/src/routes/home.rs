//! Landing page, countdown and waitlist.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Json,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use cudliy_core::{DesignerExperience, ProductionStyle, WaitlistInput};
use tower_sessions::Session;
use tracing::instrument;

use super::busy_notice;
use crate::error::add_breadcrumb;
use crate::middleware::{CspNonce, CurrentVisitor, KnownVisitor};
use crate::models::{Notice, push_notice, session_keys, take_notice};
use crate::services::{CountdownSnapshot, TimeRemaining, WaitlistError, WaitlistPresentation};
use crate::state::AppState;

/// A feature card on the landing page.
pub struct Feature {
    pub title: &'static str,
    pub body: &'static str,
}

const FEATURES: [Feature; 3] = [
    Feature {
        title: "Made with Love",
        body: "Every creation is crafted with attention to detail and care that shows in the final product.",
    },
    Feature {
        title: "Fully Customizable",
        body: "Choose colors, sizes, accessories, and even add personal messages to make it truly unique.",
    },
    Feature {
        title: "Premium Quality",
        body: "Using high-grade materials and precision 3D printing for durability and safety.",
    },
];

/// Landing page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub signed_in: bool,
    pub notice: Option<Notice>,
    pub nonce: String,
    pub remaining: TimeRemaining,
    pub target: Option<String>,
    pub target_label: String,
    pub features: &'static [Feature],
    pub split_layout: bool,
    pub form: WaitlistInput,
    pub experience_options: Vec<&'static str>,
    pub production_options: Vec<&'static str>,
}

/// Display the landing page.
#[instrument(skip_all)]
pub async fn home(
    State(state): State<AppState>,
    visitor: KnownVisitor,
    session: Session,
    nonce: CspNonce,
) -> impl IntoResponse {
    let now = Utc::now();
    let countdown = state.countdown();
    let form = session
        .remove::<WaitlistInput>(session_keys::WAITLIST_FORM)
        .await
        .ok()
        .flatten()
        .unwrap_or_default();

    HomeTemplate {
        signed_in: visitor.signed_in(),
        notice: take_notice(&session).await,
        nonce: nonce.0,
        remaining: countdown.remaining(now),
        target: countdown.target(now).map(|target| target.to_rfc3339()),
        target_label: countdown.target_label(now),
        features: &FEATURES,
        split_layout: state.waitlist().presentation() == WaitlistPresentation::Split,
        form,
        experience_options: DesignerExperience::ALL.iter().map(|o| o.label()).collect(),
        production_options: ProductionStyle::ALL.iter().map(|o| o.label()).collect(),
    }
}

/// Current countdown values, polled by the page script when it reaches zero.
pub async fn countdown(State(state): State<AppState>) -> Json<CountdownSnapshot> {
    Json(state.countdown().snapshot(Utc::now()))
}

/// Handle a waitlist submission.
#[instrument(skip_all)]
pub async fn join_waitlist(
    State(state): State<AppState>,
    CurrentVisitor(visitor): CurrentVisitor,
    session: Session,
    Form(input): Form<WaitlistInput>,
) -> Response {
    let Some(_submitting) = visitor.begin_submission() else {
        push_notice(&session, busy_notice()).await;
        return Redirect::to("/#waitlist").into_response();
    };

    let notice = match state.waitlist().submit(&input).await {
        Ok(outcome) => {
            add_breadcrumb("waitlist", "Waitlist submission", None);
            outcome.notice()
        }
        Err(e) => {
            if matches!(e, WaitlistError::Invalid(_)) {
                if let Err(e) = session.insert(session_keys::WAITLIST_FORM, &input).await {
                    tracing::warn!(error = %e, "failed to keep waitlist input");
                }
            }
            e.notice()
        }
    };

    push_notice(&session, notice).await;
    Redirect::to("/#waitlist").into_response()
}
