//! Types stored in the cookie session.

pub mod session;

pub use session::{Notice, NoticeVariant, keys as session_keys, push_notice, take_notice};
