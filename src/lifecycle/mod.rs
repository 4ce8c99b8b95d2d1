//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → resolve shutdown future
//!
//! Shutdown (shutdown.rs):
//!     trigger → broadcast to health monitor, analytics worker, janitors
//!
//! Background work (background.rs):
//!     request handler → spawn deferred task → log on failure
//!     shutdown → close tracker → wait (bounded) for pending tasks
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accepting, stop loops, drain deferred work
//! - Shutdown has timeout: pending work is abandoned after the deadline

pub mod background;
pub mod shutdown;
pub mod signals;

pub use background::BackgroundTasks;
pub use shutdown::Shutdown;
