//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! The gateway additionally produces one analytics event per request:
//!     → analytics.rs (bounded queue → worker → sink)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Metrics/alerting ingestion endpoint (analytics HTTP sink)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through all subsystems
//! - Metrics are cheap (atomic increments)
//! - Nothing in this module may block or fail a request

pub mod analytics;
pub mod logging;
pub mod metrics;

pub use analytics::{
    AnalyticsEmitter, AnalyticsEvent, AnalyticsWorker, EventKind, EventSink, HttpSink, LogSink, SinkError,
};
