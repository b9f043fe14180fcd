//! HTTP middleware stack.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request span with `request_id` and `visitor_id` fields)
//! 3. Request ID
//! 4. Security headers and CSP nonce
//! 5. Session layer (tower-sessions, bounded moka store)
//! 6. Rate limiting on credential and waitlist POSTs (governor)

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{
    CurrentVisitor, GuardRejection, KnownVisitor, RequireAuth, RequireSegment, settled_state,
};
pub use rate_limit::{credentials_rate_limiter, waitlist_rate_limiter};
pub use request_id::{RequestId, request_id_middleware};
pub use security_headers::{CspNonce, security_headers_middleware};
pub use session::create_session_layer;
