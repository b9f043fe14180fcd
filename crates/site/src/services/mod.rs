//! Business logic services.
//!
//! - `countdown` - launch countdown arithmetic
//! - `visitors` - per-browser session store and auth context registry
//! - `waitlist` - waitlist validation, duplicate handling and notices

pub mod countdown;
pub mod visitors;
pub mod waitlist;

pub use countdown::{CountdownMode, CountdownSnapshot, LaunchCountdown, TimeRemaining};
pub use visitors::{SubmissionGuard, Visitor, VisitorRegistry};
pub use waitlist::{
    WaitlistError, WaitlistOutcome, WaitlistPresentation, WaitlistService, WaitlistTable,
};
