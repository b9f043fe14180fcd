//! GoTrue (Supabase Auth) API.

use chrono::{DateTime, Duration, Utc};
use cudliy_core::UserId;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{SupabaseClient, SupabaseError, check, json};

/// Sessions this close to expiry are refreshed before use.
const EXPIRY_MARGIN_SECONDS: i64 = 30;

/// An auth user as returned by GoTrue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// Free-form metadata attached at sign-up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// An authenticated session: tokens plus the user they belong to.
///
/// Implements `Debug` manually to redact the tokens.
#[derive(Clone)]
pub struct AuthSession {
    access_token: SecretString,
    refresh_token: SecretString,
    expires_at: DateTime<Utc>,
    user: AuthUser,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

impl AuthSession {
    /// Build a session from its parts.
    #[must_use]
    pub fn new(
        access_token: SecretString,
        refresh_token: SecretString,
        expires_at: DateTime<Utc>,
        user: AuthUser,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at,
            user,
        }
    }

    #[must_use]
    pub const fn user(&self) -> &AuthUser {
        &self.user
    }

    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub(crate) fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    pub(crate) fn refresh_token(&self) -> &str {
        self.refresh_token.expose_secret()
    }

    /// Whether the access token is expired (or about to be) at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECONDS) <= now
    }
}

/// Token grant response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(|| now + Duration::seconds(self.expires_in));

        AuthSession {
            access_token: SecretString::from(self.access_token),
            refresh_token: SecretString::from(self.refresh_token),
            expires_at,
            user: self.user,
        }
    }
}

/// Sign-up response: a full session when email confirmation is disabled,
/// otherwise just the (unconfirmed) user.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(AuthUser),
}

/// Result of a successful sign-up.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// The user is signed in immediately.
    SignedIn(AuthSession),
    /// The user must confirm their email before signing in.
    ConfirmationRequired(AuthUser),
}

impl SignUpOutcome {
    #[must_use]
    pub const fn user(&self) -> &AuthUser {
        match self {
            Self::SignedIn(session) => &session.user,
            Self::ConfirmationRequired(user) => user,
        }
    }
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: UserMetadata,
}

impl SupabaseClient {
    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `SupabaseError::Api` with GoTrue's message (e.g. "Invalid
    /// login credentials") when the credentials are rejected.
    #[instrument(skip(self, password))]
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, SupabaseError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self
            .http
            .post(url)
            .bearer_auth(self.anon_bearer())
            .json(&PasswordGrant { email, password })
            .send()
            .await?;

        let token: TokenResponse = json(response).await?;
        Ok(token.into_session(Utc::now()))
    }

    /// Exchange a refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns `SupabaseError::Api` when the refresh token is invalid or
    /// already used.
    #[instrument(skip_all, fields(user_id = %session.user.id))]
    pub async fn refresh_session(&self, session: &AuthSession) -> Result<AuthSession, SupabaseError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");

        let response = self
            .http
            .post(url)
            .bearer_auth(self.anon_bearer())
            .json(&RefreshGrant {
                refresh_token: session.refresh_token(),
            })
            .send()
            .await?;

        let token: TokenResponse = json(response).await?;
        Ok(token.into_session(Utc::now()))
    }

    /// Create an account.
    ///
    /// # Errors
    ///
    /// Returns `SupabaseError::Api` with GoTrue's message (e.g. "User
    /// already registered") when sign-up is rejected.
    #[instrument(skip(self, password, full_name))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<SignUpOutcome, SupabaseError> {
        let url = self.endpoint("auth/v1/signup")?;

        let response = self
            .http
            .post(url)
            .bearer_auth(self.anon_bearer())
            .json(&SignUpRequest {
                email,
                password,
                data: UserMetadata {
                    full_name: full_name.map(str::to_string),
                },
            })
            .send()
            .await?;

        let outcome = match json::<SignUpResponse>(response).await? {
            SignUpResponse::Session(token) => SignUpOutcome::SignedIn(token.into_session(Utc::now())),
            SignUpResponse::User(user) => SignUpOutcome::ConfirmationRequired(user),
        };
        Ok(outcome)
    }

    /// Revoke the session's refresh token server-side.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails. A 401 (token already expired or
    /// revoked) is not an error.
    #[instrument(skip_all, fields(user_id = %session.user.id))]
    pub async fn sign_out(&self, session: &AuthSession) -> Result<(), SupabaseError> {
        let url = self.endpoint("auth/v1/logout")?;

        let response = self
            .http
            .post(url)
            .bearer_auth(session.access_token())
            .send()
            .await?;

        if matches!(response.status().as_u16(), 401 | 404) {
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }

    /// GoTrue health check, used by the readiness probe.
    ///
    /// # Errors
    ///
    /// Returns error if the auth service is unreachable or unhealthy.
    pub async fn auth_health(&self) -> Result<(), SupabaseError> {
        let url = self.endpoint("auth/v1/health")?;
        let response = self
            .http
            .get(url)
            .bearer_auth(self.anon_bearer())
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}
