//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID + trace layers)
//!     → gateway.rs (orchestration, fallback on any failure)
//!         → request.rs (buffered descriptor, client IP, country)
//!         → response.rs (fallback page, 429, client errors)
//!     → Send to client
//! ```

pub mod gateway;
pub mod request;
pub mod response;
pub mod server;

pub use gateway::{Gateway, GatewayError, Outcome};
pub use request::{RequestDescriptor, X_REQUEST_ID};
pub use server::{GatewayServer, ServerError};
