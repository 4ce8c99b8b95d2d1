//! Edge request gateway library.

pub mod actor;
pub mod admin;
pub mod assets;
pub mod cache;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod store;
pub mod upstream;

pub use config::GatewayConfig;
pub use http::{Gateway, GatewayServer};
pub use lifecycle::Shutdown;
