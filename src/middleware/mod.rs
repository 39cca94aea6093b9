//! Middleware for the Rodada API
//!
//! Request tracing and response security headers. Webhook traffic is
//! high-volume and chatty, so the tracing stays one line per request.

mod security;
mod tracing;

pub use security::security_headers;
pub use tracing::request_tracing;
