//! PostgREST table access (`profiles`, `waitlist`).

use cudliy_core::{Profile, Segment, UserId, WaitlistEntry, WaitlistRole};
use serde::Serialize;
use tracing::instrument;

use super::{AuthSession, SupabaseClient, SupabaseError, check, json};

const PROFILES: &str = "rest/v1/profiles";
const WAITLIST: &str = "rest/v1/waitlist";

#[derive(Serialize)]
struct NewProfile<'a> {
    id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    full_name: Option<&'a str>,
}

#[derive(Serialize)]
struct SegmentUpdate {
    segment: Segment,
}

impl SupabaseClient {
    /// Fetch the profile row for the session's user.
    ///
    /// Zero rows is `Ok(None)`, not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the row cannot be decoded.
    #[instrument(skip_all, fields(user_id = %session.user().id))]
    pub async fn get_profile(&self, session: &AuthSession) -> Result<Option<Profile>, SupabaseError> {
        let mut url = self.endpoint(PROFILES)?;
        url.query_pairs_mut()
            .append_pair("select", Profile::COLUMNS)
            .append_pair("id", &format!("eq.{}", session.user().id))
            .append_pair("limit", "1");

        let response = self
            .http
            .get(url)
            .bearer_auth(session.access_token())
            .send()
            .await?;

        let rows: Vec<Profile> = json(response).await?;
        Ok(rows.into_iter().next())
    }

    /// Create the profile row at registration, with no segment.
    ///
    /// Uses the new user's session when one was issued, otherwise the anon
    /// key (which row-level security may reject).
    ///
    /// # Errors
    ///
    /// Returns error if the insert is rejected.
    #[instrument(skip(self, session, full_name))]
    pub async fn insert_profile(
        &self,
        session: Option<&AuthSession>,
        id: UserId,
        full_name: Option<&str>,
    ) -> Result<(), SupabaseError> {
        let url = self.endpoint(PROFILES)?;
        let bearer = session.map_or_else(|| self.anon_bearer(), AuthSession::access_token);

        let response = self
            .http
            .post(url)
            .bearer_auth(bearer)
            .header("Prefer", "return=minimal")
            .json(&NewProfile { id, full_name })
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }

    /// Set the segment on the session user's profile.
    ///
    /// # Errors
    ///
    /// Returns error if the update is rejected.
    #[instrument(skip_all, fields(user_id = %session.user().id, segment = %segment))]
    pub async fn update_segment(
        &self,
        session: &AuthSession,
        segment: Segment,
    ) -> Result<(), SupabaseError> {
        let mut url = self.endpoint(PROFILES)?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", session.user().id));

        let response = self
            .http
            .patch(url)
            .bearer_auth(session.access_token())
            .header("Prefer", "return=minimal")
            .json(&SegmentUpdate { segment })
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }

    /// Whether a waitlist row already exists for `email` (and `role`, when given).
    ///
    /// # Errors
    ///
    /// Returns error if the lookup fails.
    #[instrument(skip(self))]
    pub async fn waitlist_contains(
        &self,
        email: &str,
        role: Option<WaitlistRole>,
    ) -> Result<bool, SupabaseError> {
        let mut url = self.endpoint(WAITLIST)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("select", "email")
                .append_pair("email", &format!("eq.{email}"));
            if let Some(role) = role {
                query.append_pair("role", &format!("eq.{role}"));
            }
            query.append_pair("limit", "1");
        }

        let response = self
            .http
            .get(url)
            .bearer_auth(self.anon_bearer())
            .send()
            .await?;

        let rows: Vec<serde_json::Value> = json(response).await?;
        Ok(!rows.is_empty())
    }

    /// Insert a waitlist row.
    ///
    /// # Errors
    ///
    /// Returns error if the insert is rejected; a duplicate surfaces as an
    /// API error with code `23505`.
    #[instrument(skip_all, fields(email = %entry.email, role = ?entry.role))]
    pub async fn insert_waitlist(&self, entry: &WaitlistEntry) -> Result<(), SupabaseError> {
        let url = self.endpoint(WAITLIST)?;

        let response = self
            .http
            .post(url)
            .bearer_auth(self.anon_bearer())
            .header("Prefer", "return=minimal")
            .json(entry)
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }
}
