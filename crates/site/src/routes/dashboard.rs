//! Dashboard, reachable only after onboarding.

use askama::Template;
use askama_web::WebTemplate;
use axum::response::IntoResponse;
use tower_sessions::Session;

use crate::middleware::RequireSegment;
use crate::models::{Notice, take_notice};

/// Dashboard template.
#[derive(Template, WebTemplate)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub signed_in: bool,
    pub notice: Option<Notice>,
    pub email: String,
    pub full_name: String,
    pub segment_title: &'static str,
    pub segment_description: &'static str,
}

/// Display the dashboard.
pub async fn show(RequireSegment { auth, .. }: RequireSegment, session: Session) -> impl IntoResponse {
    let email = auth
        .user
        .as_ref()
        .and_then(|user| user.email.clone())
        .unwrap_or_default();
    let full_name = auth
        .profile
        .as_ref()
        .and_then(|profile| profile.display_name())
        .unwrap_or("—")
        .to_string();
    let segment = auth.segment();

    DashboardTemplate {
        signed_in: true,
        notice: take_notice(&session).await,
        email,
        full_name,
        segment_title: segment.map_or("—", |s| s.title()),
        segment_description: segment.map_or("", |s| s.description()),
    }
}
