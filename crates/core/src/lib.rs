//! Cudliy Core - Shared domain types.
//!
//! This crate provides the types shared by the site and its tests:
//! - [`Email`] - validated email addresses
//! - [`UserId`] - Supabase auth user identifiers
//! - [`Segment`] - the self-selected role that gates the main application
//! - [`Profile`] - the application-owned profile row
//! - [`WaitlistEntry`] - unauthenticated lead-capture records
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no HTTP
//! clients. Persistence is owned by the hosted backend; these types are the
//! transient in-memory copies the site works with.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
