//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, apply GATEWAY_* env overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; there is no runtime mutation path
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::{
    AdminConfig, AnalyticsConfig, AnalyticsSinkKind, CacheConfig, CachePolicyEntry, CorsConfig,
    GatewayConfig, GeoConfig, HealthCheckConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    OriginConfig, RateLimitConfig, StaticAssetConfig, TierLimit, TierRule,
};
