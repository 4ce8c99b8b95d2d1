//! Origin health monitoring.
//!
//! # Data Flow
//! ```text
//! Periodic timer (independent of traffic)
//!     → GET <origin><health path> for primary and failover
//!     → log + gateway_origin_up gauge
//!     → HealthBoard (read by GET /admin/origins)
//! ```
//!
//! # Design Decisions
//! - Observational only: results never change which origin is tried first

pub mod active;

pub use active::{HealthBoard, HealthMonitor, CheckResult};
