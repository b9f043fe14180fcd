//! Supabase HTTP client.
//!
//! Talks to the two Supabase services the site depends on:
//! - GoTrue (`/auth/v1/*`) for credentials and sessions, see [`auth`]
//! - PostgREST (`/rest/v1/*`) for the `profiles` and `waitlist` tables, see [`rest`]
//!
//! Every request carries the anon key as `apikey`. The `Authorization`
//! header is the anon key for public calls and the user's access token for
//! row-level-security calls on behalf of a signed-in user.

pub mod auth;
pub mod rest;

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::SupabaseConfig;

pub use auth::{AuthSession, AuthUser, SignUpOutcome};

/// PostgreSQL unique constraint violation.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Errors that can occur when talking to Supabase.
#[derive(Debug, Error)]
pub enum SupabaseError {
    /// HTTP request failed (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Failed to parse a response body.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Failed to build a request URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl SupabaseError {
    /// The backend error code (PostgreSQL SQLSTATE or GoTrue error code).
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// HTTP status of an API error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this is a unique constraint violation (duplicate row).
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        self.code() == Some(UNIQUE_VIOLATION)
    }

    /// Whether the request never got an answer from the service.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Http(_))
    }

    /// Message suitable for showing to the visitor.
    ///
    /// API errors carry the service's own message (e.g. "Invalid login
    /// credentials"); transport failures get a generic one.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            Self::Http(_) => "Could not reach the server. Please try again.".to_string(),
            Self::Parse(_) | Self::Url(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

/// Error body shapes returned by GoTrue and PostgREST.
///
/// GoTrue uses `msg`/`error_description`/`error` (and, in newer versions, a
/// numeric `code` plus a string `error_code`); PostgREST uses a string
/// `code` (SQLSTATE) plus `message`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<serde_json::Value>,
    error_code: Option<String>,
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn code(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(code)) => Some(code.clone()),
            _ => self.error_code.clone(),
        }
    }

    fn message(self) -> Option<String> {
        self.msg
            .or(self.message)
            .or(self.error_description)
            .or(self.error)
    }
}

/// Turn a non-success response into [`SupabaseError::Api`].
async fn api_error(response: reqwest::Response) -> SupabaseError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let code = body.code();
    let message = body.message().unwrap_or_else(|| {
        if text.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        } else {
            text
        }
    });

    SupabaseError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

/// Check a response status, converting failures into [`SupabaseError`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response, SupabaseError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(api_error(response).await)
    }
}

/// Decode a JSON response body.
async fn json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, SupabaseError> {
    let response = check(response).await?;
    response
        .json()
        .await
        .map_err(|e| SupabaseError::Parse(e.to_string()))
}

/// Supabase API client.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: Url,
    anon_key: SecretString,
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl SupabaseClient {
    /// Create a new Supabase client.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &SupabaseConfig) -> Result<Self, SupabaseError> {
        let mut headers = HeaderMap::new();

        let mut apikey = HeaderValue::from_str(config.anon_key.expose_secret())
            .map_err(|e| SupabaseError::Parse(format!("Invalid API key format: {e}")))?;
        apikey.set_sensitive(true);
        headers.insert("apikey", apikey);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("cudliy-site/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(std::time::Duration::from_secs(5))
            .timeout(std::time::Duration::from_secs(15))
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
        })
    }

    /// Resolve a path (without leading `/`) against the project URL.
    fn endpoint(&self, path: &str) -> Result<Url, SupabaseError> {
        Ok(self.base_url.join(path)?)
    }

    /// Bearer value for public (anon) calls.
    fn anon_bearer(&self) -> &str {
        self.anon_key.expose_secret()
    }
}
