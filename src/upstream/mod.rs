//! Origin forwarding.
//!
//! # Data Flow
//! ```text
//! RequestDescriptor
//!     → failover.rs: primary origin (bounded timeout)
//!         ok, status < 500       → authoritative response
//!         error | timeout | 5xx  → failover origin (bounded timeout)
//!             ok                 → response
//!             error | timeout    → FetchError → gateway fallback
//! ```
//!
//! # Design Decisions
//! - Exactly one failover attempt, no backoff
//! - Health checks never influence the choice of origin

pub mod failover;

use std::fmt;
use std::time::Duration;

use serde::Serialize;

pub use failover::{OriginFetcher, OriginResponse};

/// Which of the two configured origins served (or failed) a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginRole {
    Primary,
    Failover,
}

impl OriginRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginRole::Primary => "primary",
            OriginRole::Failover => "failover",
        }
    }
}

impl fmt::Display for OriginRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level failure talking to an origin.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid {origin} origin target: {message}")]
    InvalidTarget { origin: OriginRole, message: String },

    #[error("{origin} origin request failed: {source}")]
    Transport {
        origin: OriginRole,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    #[error("{origin} origin body read failed: {source}")]
    Body {
        origin: OriginRole,
        #[source]
        source: hyper::Error,
    },

    #[error("{origin} origin timed out after {timeout:?}")]
    Timeout { origin: OriginRole, timeout: Duration },
}

impl FetchError {
    pub fn origin(&self) -> OriginRole {
        match self {
            FetchError::InvalidTarget { origin, .. }
            | FetchError::Transport { origin, .. }
            | FetchError::Body { origin, .. }
            | FetchError::Timeout { origin, .. } => *origin,
        }
    }
}
