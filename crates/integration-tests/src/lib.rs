//! Integration tests for the Cudliy site.
//!
//! Each test starts the real site router on an ephemeral port, backed by
//! [`FakeSupabase`]: a small in-memory stand-in for the GoTrue and PostgREST
//! endpoints the site calls. No external services are needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cudliy-integration-tests
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use cudliy_site::auth::ProfileErrorPolicy;
use cudliy_site::config::{SiteConfig, SupabaseConfig};
use cudliy_site::services::{CountdownMode, WaitlistPresentation};
use cudliy_site::state::AppState;
use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;
use uuid::Uuid;

// ============================================================================
// Fake Supabase
// ============================================================================

#[derive(Debug, Clone)]
struct FakeUser {
    id: Uuid,
    email: String,
    password: String,
    full_name: Option<String>,
}

impl FakeUser {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "email": self.email,
            "user_metadata": { "full_name": self.full_name },
        })
    }
}

#[derive(Debug, Default)]
struct FakeData {
    users: HashMap<String, FakeUser>,
    refresh_tokens: HashMap<String, Uuid>,
    profiles: HashMap<Uuid, Value>,
    waitlist: Vec<Value>,
    require_confirmation: bool,
    fail_profiles: bool,
    expired_sessions: usize,
    refresh_grants: usize,
    issued_tokens: Vec<String>,
    profile_write_tokens: Vec<String>,
}

/// In-memory GoTrue + PostgREST stand-in.
#[derive(Debug, Clone, Default)]
pub struct FakeSupabase {
    data: Arc<Mutex<FakeData>>,
}

impl FakeSupabase {
    fn data(&self) -> MutexGuard<'_, FakeData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a confirmed user with an empty profile row; returns the user id.
    pub fn add_user(&self, email: &str, password: &str, full_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let mut data = self.data();
        data.users.insert(
            email.to_string(),
            FakeUser {
                id,
                email: email.to_string(),
                password: password.to_string(),
                full_name: Some(full_name.to_string()),
            },
        );
        data.profiles.insert(id, new_profile(id, Some(full_name)));
        id
    }

    /// Set a profile's segment directly.
    pub fn set_segment(&self, id: Uuid, segment: &str) {
        if let Some(profile) = self.data().profiles.get_mut(&id) {
            profile["segment"] = json!(segment);
        }
    }

    /// Segment stored for a user, if any.
    pub fn segment_of(&self, id: Uuid) -> Option<String> {
        self.data()
            .profiles
            .get(&id)
            .and_then(|profile| profile["segment"].as_str().map(str::to_string))
    }

    /// Id of the user registered with `email`.
    pub fn user_id(&self, email: &str) -> Option<Uuid> {
        self.data().users.get(email).map(|user| user.id)
    }

    /// Number of waitlist rows.
    pub fn waitlist_len(&self) -> usize {
        self.data().waitlist.len()
    }

    /// Make sign-up return an unconfirmed user instead of a session.
    pub fn require_confirmation(&self, on: bool) {
        self.data().require_confirmation = on;
    }

    /// Make every profile read fail with a 500.
    pub fn fail_profiles(&self, on: bool) {
        self.data().fail_profiles = on;
    }

    /// Issue the next `count` sessions already expired.
    pub fn expire_next_sessions(&self, count: usize) {
        self.data().expired_sessions = count;
    }

    /// Number of successful refresh-token grants.
    pub fn refresh_grants(&self) -> usize {
        self.data().refresh_grants
    }

    /// Most recently issued access token.
    pub fn last_issued_token(&self) -> Option<String> {
        self.data().issued_tokens.last().cloned()
    }

    /// Bearer token of the most recent profile update.
    pub fn last_profile_write_token(&self) -> Option<String> {
        self.data().profile_write_tokens.last().cloned()
    }

    fn router(self) -> Router {
        Router::new()
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/signup", post(signup))
            .route("/auth/v1/logout", post(logout))
            .route("/auth/v1/health", get(|| async { Json(json!({"name": "GoTrue"})) }))
            .route(
                "/rest/v1/profiles",
                get(select_profile).post(insert_profile).patch(update_profile),
            )
            .route("/rest/v1/waitlist", get(select_waitlist).post(insert_waitlist))
            .with_state(self)
    }

    /// Serve on an ephemeral port; returns the project URL.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot bind.
    pub async fn spawn(&self) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake supabase");
        let addr = listener.local_addr().expect("fake supabase address");
        let router = self.clone().router();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        Url::parse(&format!("http://{addr}/")).expect("fake supabase url")
    }
}

fn new_profile(id: Uuid, full_name: Option<&str>) -> Value {
    json!({
        "id": id,
        "full_name": full_name,
        "segment": null,
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": null,
    })
}

fn issue_session(data: &mut FakeData, user: &FakeUser) -> Value {
    let refresh_token = Uuid::new_v4().to_string();
    data.refresh_tokens.insert(refresh_token.clone(), user.id);
    let access_token = format!("access-{}", Uuid::new_v4());
    data.issued_tokens.push(access_token.clone());
    let expires_in = if data.expired_sessions > 0 {
        data.expired_sessions -= 1;
        0
    } else {
        3600
    };
    json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
        "token_type": "bearer",
        "expires_in": expires_in,
        "user": user.to_json(),
    })
}

fn postgrest_error(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "code": code, "message": message, "details": null, "hint": null })))
        .into_response()
}

/// `eq.value` filter from a PostgREST query string.
fn eq_filter<'a>(query: &'a HashMap<String, String>, column: &str) -> Option<&'a str> {
    query.get(column).and_then(|value| value.strip_prefix("eq."))
}

async fn token(
    State(fake): State<FakeSupabase>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let mut data = fake.data();
    let user = match query.get("grant_type").map(String::as_str) {
        Some("password") => {
            let email = body["email"].as_str().unwrap_or_default();
            let password = body["password"].as_str().unwrap_or_default();
            data.users
                .get(email)
                .filter(|user| user.password == password)
                .cloned()
        }
        Some("refresh_token") => {
            let token = body["refresh_token"].as_str().unwrap_or_default();
            let user = data
                .refresh_tokens
                .remove(token)
                .and_then(|id| data.users.values().find(|user| user.id == id).cloned());
            if user.is_some() {
                data.refresh_grants += 1;
            }
            user
        }
        _ => None,
    };

    match user {
        Some(user) => Json(issue_session(&mut data, &user)).into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "code": 400,
                "error_code": "invalid_credentials",
                "msg": "Invalid login credentials",
            })),
        )
            .into_response(),
    }
}

async fn signup(State(fake): State<FakeSupabase>, Json(body): Json<Value>) -> Response {
    let mut data = fake.data();
    let email = body["email"].as_str().unwrap_or_default().to_string();
    if data.users.contains_key(&email) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "code": 422,
                "error_code": "user_already_exists",
                "msg": "User already registered",
            })),
        )
            .into_response();
    }

    let user = FakeUser {
        id: Uuid::new_v4(),
        email: email.clone(),
        password: body["password"].as_str().unwrap_or_default().to_string(),
        full_name: body["data"]["full_name"].as_str().map(str::to_string),
    };
    data.users.insert(email, user.clone());

    if data.require_confirmation {
        Json(user.to_json()).into_response()
    } else {
        Json(issue_session(&mut data, &user)).into_response()
    }
}

async fn logout() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn select_profile(
    State(fake): State<FakeSupabase>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let data = fake.data();
    if data.fail_profiles {
        return postgrest_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "XX000",
            "profiles temporarily unavailable",
        );
    }
    let rows: Vec<Value> = eq_filter(&query, "id")
        .and_then(|id| id.parse::<Uuid>().ok())
        .and_then(|id| data.profiles.get(&id).cloned())
        .into_iter()
        .collect();
    Json(rows).into_response()
}

async fn insert_profile(State(fake): State<FakeSupabase>, Json(body): Json<Value>) -> Response {
    let mut data = fake.data();
    let Some(id) = body["id"].as_str().and_then(|id| id.parse::<Uuid>().ok()) else {
        return postgrest_error(StatusCode::BAD_REQUEST, "22P02", "invalid id");
    };
    if data.profiles.contains_key(&id) {
        return postgrest_error(
            StatusCode::CONFLICT,
            "23505",
            "duplicate key value violates unique constraint \"profiles_pkey\"",
        );
    }
    data.profiles
        .insert(id, new_profile(id, body["full_name"].as_str()));
    StatusCode::CREATED.into_response()
}

async fn update_profile(
    State(fake): State<FakeSupabase>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let mut data = fake.data();
    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    {
        data.profile_write_tokens.push(token.to_string());
    }
    let id = eq_filter(&query, "id").and_then(|id| id.parse::<Uuid>().ok());
    // Zero matching rows is still a success in PostgREST.
    if let Some(profile) = id.and_then(|id| data.profiles.get_mut(&id)) {
        profile["segment"] = body["segment"].clone();
        profile["updated_at"] = json!(Utc::now().to_rfc3339());
    }
    StatusCode::NO_CONTENT
}

async fn select_waitlist(
    State(fake): State<FakeSupabase>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Vec<Value>> {
    let data = fake.data();
    let email = eq_filter(&query, "email");
    let role = eq_filter(&query, "role");
    let rows = data
        .waitlist
        .iter()
        .filter(|row| row["email"].as_str() == email)
        .filter(|row| role.is_none_or(|role| row["role"].as_str() == Some(role)))
        .map(|row| json!({ "email": row["email"] }))
        .collect();
    Json(rows)
}

async fn insert_waitlist(State(fake): State<FakeSupabase>, Json(body): Json<Value>) -> Response {
    let mut data = fake.data();
    let duplicate = data
        .waitlist
        .iter()
        .any(|row| row["email"] == body["email"] && row["role"] == body["role"]);
    if duplicate {
        return postgrest_error(
            StatusCode::CONFLICT,
            "23505",
            "duplicate key value violates unique constraint \"waitlist_email_role_key\"",
        );
    }
    data.waitlist.push(body);
    StatusCode::CREATED.into_response()
}

// ============================================================================
// Site under test
// ============================================================================

/// The site running against a [`FakeSupabase`], with a cookie-keeping
/// client that does not follow redirects.
pub struct TestSite {
    pub base_url: String,
    pub supabase: FakeSupabase,
    client: reqwest::Client,
}

impl TestSite {
    /// Start with the default configuration.
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    /// Start with a configuration tweak applied.
    ///
    /// # Panics
    ///
    /// Panics if a listener cannot bind or the state cannot be built.
    pub async fn start_with(configure: impl FnOnce(&mut SiteConfig)) -> Self {
        let supabase = FakeSupabase::default();
        let project_url = supabase.spawn().await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind site");
        let addr = listener.local_addr().expect("site address");
        let base_url = format!("http://{addr}");

        let mut config = SiteConfig {
            host: addr.ip(),
            port: addr.port(),
            base_url: base_url.clone(),
            supabase: SupabaseConfig {
                url: project_url,
                anon_key: SecretString::from("test-anon-key"),
            },
            launch_at: Utc::now() + chrono::Duration::days(30),
            countdown_mode: CountdownMode::RollOver,
            waitlist_layout: WaitlistPresentation::Split,
            profile_errors: ProfileErrorPolicy::TreatAsMissing,
            auth_settle_timeout: Duration::from_secs(2),
            rate_limit: false,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 0.0,
            sentry_traces_sample_rate: 0.0,
        };
        configure(&mut config);

        let state = AppState::new(config).expect("app state");
        let app = cudliy_site::app(state);
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .ok();
        });

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("http client");

        Self {
            base_url,
            supabase,
            client,
        }
    }

    /// GET a path.
    ///
    /// # Panics
    ///
    /// Panics if the request fails.
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .expect("GET request")
    }

    /// POST a urlencoded form.
    ///
    /// # Panics
    ///
    /// Panics if the request fails.
    pub async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.base_url))
            .form(form)
            .send()
            .await
            .expect("POST request")
    }

    /// GET the body of a page.
    ///
    /// # Panics
    ///
    /// Panics if the request fails.
    pub async fn page(&self, path: &str) -> String {
        self.get(path).await.text().await.expect("response body")
    }

    /// Sign in through the login form.
    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.post_form("/login", &[("email", email), ("password", password)])
            .await
    }
}

/// The `Location` header of a redirect.
#[must_use]
pub fn location(response: &reqwest::Response) -> Option<&str> {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|value| value.to_str().ok())
}
