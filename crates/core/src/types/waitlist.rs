//! Waitlist entries.
//!
//! Waitlist entries are unauthenticated lead-capture records, unrelated to
//! the auth user / profile model. They are created once per submission and
//! never updated. The backend enforces uniqueness on `email` (no role) or on
//! `(email, role)`.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::{Email, EmailError};

/// Validation failures, reported inline before any network call.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitlistValidationError {
    #[error("Please enter your first name")]
    MissingFirstName,
    #[error("Please enter your last name")]
    MissingLastName,
    #[error("Please enter your email address")]
    MissingEmail,
    #[error("Please enter a valid email address")]
    InvalidEmail(#[source] EmailError),
    #[error("Please choose whether you are joining as a designer or a maker")]
    MissingRole,
    #[error("Unknown role: {0}")]
    UnknownRole(String),
    #[error("Unknown option: {0}")]
    UnknownDetail(String),
}

/// Which waitlist a person is joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitlistRole {
    Designer,
    Maker,
}

impl WaitlistRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Designer => "designer",
            Self::Maker => "maker",
        }
    }

    /// Parse an optional role from a form field; blank means "no role".
    ///
    /// # Errors
    ///
    /// Returns [`WaitlistValidationError::UnknownRole`] for unrecognized input.
    pub fn parse_optional(input: &str) -> Result<Option<Self>, WaitlistValidationError> {
        match input.trim() {
            "" => Ok(None),
            "designer" => Ok(Some(Self::Designer)),
            "maker" => Ok(Some(Self::Maker)),
            other => Err(WaitlistValidationError::UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for WaitlistRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A designer's self-reported 3D experience.
///
/// Stored as the human-readable label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DesignerExperience {
    #[serde(rename = "No Experience")]
    NoExperience,
    #[serde(rename = "Basic CAD Knowledge")]
    BasicCad,
    #[serde(rename = "Advanced Designer")]
    Advanced,
}

impl DesignerExperience {
    pub const ALL: [Self; 3] = [Self::NoExperience, Self::BasicCad, Self::Advanced];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NoExperience => "No Experience",
            Self::BasicCad => "Basic CAD Knowledge",
            Self::Advanced => "Advanced Designer",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|option| option.label() == label)
    }
}

/// A maker's production style.
///
/// Stored as the human-readable label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductionStyle {
    #[serde(rename = "Digital Production")]
    Digital,
    #[serde(rename = "Handcrafted Production")]
    Handcrafted,
    #[serde(rename = "Hybrid")]
    Hybrid,
}

impl ProductionStyle {
    pub const ALL: [Self; 3] = [Self::Digital, Self::Handcrafted, Self::Hybrid];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Digital => "Digital Production",
            Self::Handcrafted => "Handcrafted Production",
            Self::Hybrid => "Hybrid",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|option| option.label() == label)
    }
}

/// The role-specific follow-up answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitlistDetail {
    Experience(DesignerExperience),
    ProductionStyle(ProductionStyle),
}

/// Raw waitlist form input, exactly as posted.
///
/// Every field is a string so that a partially filled form can be rendered
/// back to the visitor after a validation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitlistInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    pub experience: String,
    pub production_style: String,
    pub business_name: String,
    pub website: String,
}

/// A validated waitlist entry, ready to insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitlistEntry {
    pub first_name: String,
    pub last_name: String,
    pub email: Email,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<WaitlistRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience: Option<DesignerExperience>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_style: Option<ProductionStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl WaitlistEntry {
    /// Validate raw form input.
    ///
    /// Fields are checked in form order (first name, last name, email, role,
    /// follow-up answer) and the first failure is returned. Role-specific
    /// fields that do not belong to the chosen role are dropped, not
    /// rejected. When `require_role` is set a blank role is an error.
    ///
    /// # Errors
    ///
    /// Returns the first [`WaitlistValidationError`] encountered.
    pub fn validate(
        input: &WaitlistInput,
        require_role: bool,
    ) -> Result<Self, WaitlistValidationError> {
        let first_name = input.first_name.trim();
        if first_name.is_empty() {
            return Err(WaitlistValidationError::MissingFirstName);
        }

        let last_name = input.last_name.trim();
        if last_name.is_empty() {
            return Err(WaitlistValidationError::MissingLastName);
        }

        if input.email.trim().is_empty() {
            return Err(WaitlistValidationError::MissingEmail);
        }
        let email = Email::parse(&input.email).map_err(WaitlistValidationError::InvalidEmail)?;

        let role = WaitlistRole::parse_optional(&input.role)?;
        if require_role && role.is_none() {
            return Err(WaitlistValidationError::MissingRole);
        }

        let detail = match role {
            Some(WaitlistRole::Designer) => optional_field(&input.experience)
                .map(|label| {
                    DesignerExperience::from_label(label)
                        .map(WaitlistDetail::Experience)
                        .ok_or_else(|| WaitlistValidationError::UnknownDetail(label.to_string()))
                })
                .transpose()?,
            Some(WaitlistRole::Maker) => optional_field(&input.production_style)
                .map(|label| {
                    ProductionStyle::from_label(label)
                        .map(WaitlistDetail::ProductionStyle)
                        .ok_or_else(|| WaitlistValidationError::UnknownDetail(label.to_string()))
                })
                .transpose()?,
            None => None,
        };

        let is_maker = role == Some(WaitlistRole::Maker);

        Ok(Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email,
            role,
            experience: match detail {
                Some(WaitlistDetail::Experience(experience)) => Some(experience),
                _ => None,
            },
            production_style: match detail {
                Some(WaitlistDetail::ProductionStyle(style)) => Some(style),
                _ => None,
            },
            business_name: is_maker
                .then(|| optional_field(&input.business_name).map(str::to_string))
                .flatten(),
            website: is_maker
                .then(|| optional_field(&input.website).map(str::to_string))
                .flatten(),
        })
    }
}

fn optional_field(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input() -> WaitlistInput {
        WaitlistInput {
            first_name: " Ada ".to_string(),
            last_name: "Lovelace".to_string(),
            email: "Ada@Example.com".to_string(),
            ..WaitlistInput::default()
        }
    }

    #[test]
    fn test_minimal_entry_without_role() {
        let entry = WaitlistEntry::validate(&input(), false).unwrap();
        assert_eq!(entry.first_name, "Ada");
        assert_eq!(entry.email.as_str(), "ada@example.com");
        assert_eq!(entry.role, None);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "first_name": "Ada",
                "last_name": "Lovelace",
                "email": "ada@example.com"
            })
        );
    }

    #[test]
    fn test_fields_checked_in_form_order() {
        let empty = WaitlistInput::default();
        assert_eq!(
            WaitlistEntry::validate(&empty, false),
            Err(WaitlistValidationError::MissingFirstName)
        );

        let no_last = WaitlistInput {
            last_name: "  ".to_string(),
            ..input()
        };
        assert_eq!(
            WaitlistEntry::validate(&no_last, false),
            Err(WaitlistValidationError::MissingLastName)
        );

        let no_email = WaitlistInput {
            email: String::new(),
            ..input()
        };
        assert_eq!(
            WaitlistEntry::validate(&no_email, false),
            Err(WaitlistValidationError::MissingEmail)
        );

        let bad_email = WaitlistInput {
            email: "ada".to_string(),
            ..input()
        };
        assert!(matches!(
            WaitlistEntry::validate(&bad_email, false),
            Err(WaitlistValidationError::InvalidEmail(_))
        ));
    }

    #[test]
    fn test_role_required_when_configured() {
        assert_eq!(
            WaitlistEntry::validate(&input(), true),
            Err(WaitlistValidationError::MissingRole)
        );

        let unknown = WaitlistInput {
            role: "printer".to_string(),
            ..input()
        };
        assert!(matches!(
            WaitlistEntry::validate(&unknown, true),
            Err(WaitlistValidationError::UnknownRole(_))
        ));
    }

    #[test]
    fn test_designer_keeps_experience_and_drops_maker_fields() {
        let designer = WaitlistInput {
            role: "designer".to_string(),
            experience: "Basic CAD Knowledge".to_string(),
            production_style: "Hybrid".to_string(),
            business_name: "Ignored LLC".to_string(),
            ..input()
        };
        let entry = WaitlistEntry::validate(&designer, true).unwrap();
        assert_eq!(entry.role, Some(WaitlistRole::Designer));
        assert_eq!(entry.experience, Some(DesignerExperience::BasicCad));
        assert_eq!(entry.production_style, None);
        assert_eq!(entry.business_name, None);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["role"], "designer");
        assert_eq!(json["experience"], "Basic CAD Knowledge");
    }

    #[test]
    fn test_maker_keeps_business_fields() {
        let maker = WaitlistInput {
            role: "maker".to_string(),
            production_style: "Handcrafted Production".to_string(),
            business_name: " Print Barn ".to_string(),
            website: "https://printbarn.example".to_string(),
            ..input()
        };
        let entry = WaitlistEntry::validate(&maker, true).unwrap();
        assert_eq!(entry.production_style, Some(ProductionStyle::Handcrafted));
        assert_eq!(entry.business_name.as_deref(), Some("Print Barn"));
        assert_eq!(entry.website.as_deref(), Some("https://printbarn.example"));
    }

    #[test]
    fn test_unknown_detail_is_rejected() {
        let maker = WaitlistInput {
            role: "maker".to_string(),
            production_style: "Mass Production".to_string(),
            ..input()
        };
        assert_eq!(
            WaitlistEntry::validate(&maker, true),
            Err(WaitlistValidationError::UnknownDetail(
                "Mass Production".to_string()
            ))
        );
    }
}
