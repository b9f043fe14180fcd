//! Application-owned profile row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Segment, UserId};

/// A row of the `profiles` table, keyed 1:1 by the auth user ID.
///
/// Inserted at registration with `segment = None`, updated once by
/// onboarding, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub segment: Option<Segment>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Columns selected when reading a profile.
    pub const COLUMNS: &'static str = "id,full_name,segment,created_at,updated_at";

    /// Full name for display, if one was given and is not blank.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.full_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_postgrest_row() {
        let json = r#"{
            "id": "8d0f1c52-3b8e-4d5c-9a7e-2f1b6c0d9e11",
            "full_name": "Ada Maker",
            "segment": "printer_individual",
            "created_at": "2025-08-01T10:15:00.123456+00:00",
            "updated_at": null
        }"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.segment, Some(Segment::PrinterIndividual));
        assert_eq!(profile.display_name(), Some("Ada Maker"));
        assert!(profile.created_at.is_some());
        assert!(profile.updated_at.is_none());
    }

    #[test]
    fn test_missing_optional_columns_default() {
        let json = r#"{"id": "8d0f1c52-3b8e-4d5c-9a7e-2f1b6c0d9e11"}"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.segment, None);
        assert_eq!(profile.display_name(), None);
    }

    #[test]
    fn test_unknown_segment_is_rejected() {
        let json = r#"{"id": "8d0f1c52-3b8e-4d5c-9a7e-2f1b6c0d9e11", "segment": "vip"}"#;
        assert!(serde_json::from_str::<Profile>(json).is_err());
    }

    #[test]
    fn test_blank_full_name_is_hidden() {
        let profile = Profile {
            id: UserId::nil(),
            full_name: Some("   ".to_string()),
            segment: None,
            created_at: None,
            updated_at: None,
        };
        assert_eq!(profile.display_name(), None);
    }
}
