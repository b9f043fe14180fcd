//! Core types for Cudliy.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod profile;
pub mod segment;
pub mod waitlist;

pub use email::{Email, EmailError};
pub use id::*;
pub use profile::Profile;
pub use segment::{Segment, SegmentError, SegmentGroup, SegmentPath};
pub use waitlist::{
    DesignerExperience, ProductionStyle, WaitlistDetail, WaitlistEntry, WaitlistInput, WaitlistRole,
    WaitlistValidationError,
};
