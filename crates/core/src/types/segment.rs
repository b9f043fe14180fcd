//! User segments chosen during onboarding.
//!
//! A segment is the self-declared role that gates the main application.
//! There are exactly six, two per [`SegmentGroup`]. The grouping and the
//! [`SegmentPath`] exist for presentation only; only the segment string is
//! persisted (in `profiles.segment`).

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a string is not one of the six segment values.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    /// No value was chosen.
    #[error("please select a role to continue")]
    Empty,
    /// The value is not a known segment.
    #[error("unknown segment: {0}")]
    Unknown(String),
}

/// The role a user picks during onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    CasualBrowser,
    CasualCustomizer,
    DesignerHobbyist,
    DesignerEntrepreneur,
    PrinterIndividual,
    PrinterSmallBusiness,
}

impl Segment {
    /// Every segment, in onboarding display order.
    pub const ALL: [Self; 6] = [
        Self::CasualBrowser,
        Self::CasualCustomizer,
        Self::DesignerHobbyist,
        Self::DesignerEntrepreneur,
        Self::PrinterIndividual,
        Self::PrinterSmallBusiness,
    ];

    /// Parse a segment from its stored string form.
    ///
    /// Surrounding whitespace is ignored; anything else must match exactly.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::Empty`] for blank input and
    /// [`SegmentError::Unknown`] for any other unrecognized value.
    pub fn parse(input: &str) -> Result<Self, SegmentError> {
        let value = input.trim();
        if value.is_empty() {
            return Err(SegmentError::Empty);
        }
        Self::ALL
            .into_iter()
            .find(|segment| segment.as_str() == value)
            .ok_or_else(|| SegmentError::Unknown(value.to_string()))
    }

    /// The persisted string value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CasualBrowser => "casual_browser",
            Self::CasualCustomizer => "casual_customizer",
            Self::DesignerHobbyist => "designer_hobbyist",
            Self::DesignerEntrepreneur => "designer_entrepreneur",
            Self::PrinterIndividual => "printer_individual",
            Self::PrinterSmallBusiness => "printer_small_business",
        }
    }

    /// Short display title.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::CasualBrowser => "Browser",
            Self::CasualCustomizer => "Light Customizer",
            Self::DesignerHobbyist => "Hobbyist Designer",
            Self::DesignerEntrepreneur => "Entrepreneurial Designer",
            Self::PrinterIndividual => "Individual Printer",
            Self::PrinterSmallBusiness => "Small Business Partner",
        }
    }

    /// One-sentence description shown on the onboarding card.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::CasualBrowser => {
                "Mainly here to explore pre-made models with little or no customization."
            }
            Self::CasualCustomizer => {
                "Tweak existing designs in small ways for a bit of personalization."
            }
            Self::DesignerHobbyist => "Design toys just for personal fun and creativity.",
            Self::DesignerEntrepreneur => {
                "Sell your designs or collaborate with others on the platform."
            }
            Self::PrinterIndividual => {
                "One or two printers and an interest in small-scale printing as a side gig."
            }
            Self::PrinterSmallBusiness => {
                "A larger printing setup and an interest in a formal, ongoing partnership."
            }
        }
    }

    /// The onboarding group this segment is listed under.
    #[must_use]
    pub const fn group(self) -> SegmentGroup {
        match self {
            Self::CasualBrowser | Self::CasualCustomizer => SegmentGroup::CasualUsers,
            Self::DesignerHobbyist | Self::DesignerEntrepreneur => SegmentGroup::DedicatedDesigners,
            Self::PrinterIndividual | Self::PrinterSmallBusiness => SegmentGroup::PrinterPartners,
        }
    }

    /// The creator/maker path this segment belongs to.
    #[must_use]
    pub const fn path(self) -> SegmentPath {
        self.group().path()
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Segment {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Creator vs maker grouping, used only to organize role choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentPath {
    Creator,
    Maker,
}

/// Onboarding groups, each holding two segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentGroup {
    CasualUsers,
    DedicatedDesigners,
    PrinterPartners,
}

impl SegmentGroup {
    /// Groups in display order.
    pub const ALL: [Self; 3] = [
        Self::CasualUsers,
        Self::DedicatedDesigners,
        Self::PrinterPartners,
    ];

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::CasualUsers => "Casual Users",
            Self::DedicatedDesigners => "Dedicated Designers",
            Self::PrinterPartners => "3D Printer Partners",
        }
    }

    #[must_use]
    pub const fn blurb(self) -> &'static str {
        match self {
            Self::CasualUsers => {
                "Explore pre-made models or make light tweaks for a touch of personalization."
            }
            Self::DedicatedDesigners => "Create your own models, for fun or to build a business.",
            Self::PrinterPartners => "Use your printers to bring ideas to life and fulfill demand.",
        }
    }

    /// The two segments in this group.
    #[must_use]
    pub const fn segments(self) -> [Segment; 2] {
        match self {
            Self::CasualUsers => [Segment::CasualBrowser, Segment::CasualCustomizer],
            Self::DedicatedDesigners => {
                [Segment::DesignerHobbyist, Segment::DesignerEntrepreneur]
            }
            Self::PrinterPartners => [Segment::PrinterIndividual, Segment::PrinterSmallBusiness],
        }
    }

    #[must_use]
    pub const fn path(self) -> SegmentPath {
        match self {
            Self::CasualUsers | Self::DedicatedDesigners => SegmentPath::Creator,
            Self::PrinterPartners => SegmentPath::Maker,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_known_values() {
        for segment in Segment::ALL {
            assert_eq!(Segment::parse(segment.as_str()).unwrap(), segment);
        }
    }

    #[test]
    fn test_parse_empty_is_distinct_error() {
        assert_eq!(Segment::parse(""), Err(SegmentError::Empty));
        assert_eq!(Segment::parse("  "), Err(SegmentError::Empty));
    }

    #[test]
    fn test_parse_rejects_unknown_and_case_variants() {
        assert!(matches!(
            Segment::parse("admin"),
            Err(SegmentError::Unknown(_))
        ));
        assert!(matches!(
            Segment::parse("Casual_Browser"),
            Err(SegmentError::Unknown(_))
        ));
    }

    #[test]
    fn test_serde_uses_stored_strings() {
        for segment in Segment::ALL {
            let json = serde_json::to_string(&segment).unwrap();
            assert_eq!(json, format!("\"{}\"", segment.as_str()));
            assert_eq!(serde_json::from_str::<Segment>(&json).unwrap(), segment);
        }
        assert!(serde_json::from_str::<Segment>("\"designer\"").is_err());
    }

    #[test]
    fn test_groups_partition_segments() {
        let mut listed: Vec<Segment> = SegmentGroup::ALL
            .into_iter()
            .flat_map(SegmentGroup::segments)
            .collect();
        assert_eq!(listed.len(), 6);
        listed.dedup();
        assert_eq!(listed.as_slice(), Segment::ALL.as_slice());

        for group in SegmentGroup::ALL {
            for segment in group.segments() {
                assert_eq!(segment.group(), group);
            }
        }
    }

    #[test]
    fn test_paths() {
        assert_eq!(Segment::CasualCustomizer.path(), SegmentPath::Creator);
        assert_eq!(Segment::DesignerEntrepreneur.path(), SegmentPath::Creator);
        assert_eq!(Segment::PrinterIndividual.path(), SegmentPath::Maker);
        assert_eq!(Segment::PrinterSmallBusiness.path(), SegmentPath::Maker);
    }
}
