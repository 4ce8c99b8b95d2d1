//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → cors.rs (answer preflights, nothing else runs)
//!     → rate_limit.rs (per-client fixed-window admission)
//!     → ... gateway ...
//! Outgoing response:
//!     → headers.rs (security header set, hop-by-hop stripping)
//! ```
//!
//! # Design Decisions
//! - Security headers are applied on every path, including fallbacks
//! - Rate limiting fails open when its store is unavailable

pub mod cors;
pub mod headers;
pub mod rate_limit;

pub use cors::CorsPolicy;
pub use headers::apply_security_headers;
pub use rate_limit::{Admission, RateLimiter, Rejection, Tier};
