//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the edge gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Public listener (bind address, body limits).
    pub listener: ListenerConfig,

    /// Primary and failover origin servers.
    pub origins: OriginConfig,

    /// Response cache and content-class policy table.
    pub cache: CacheConfig,

    /// Fixed-window rate limiting per client and tier.
    pub rate_limit: RateLimitConfig,

    /// CORS preflight allow-list.
    pub cors: CorsConfig,

    /// Content-addressed static assets.
    pub static_assets: StaticAssetConfig,

    /// Client IP and geolocation tagging.
    pub geo: GeoConfig,

    /// Origin health probing.
    pub health_check: HealthCheckConfig,

    /// Per-request analytics events.
    pub analytics: AnalyticsConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Admin API (sessions, exact counters, status).
    pub admin: AdminConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum buffered request body size in bytes.
    pub max_body_size: usize,

    /// Scheme of the public URL clients address, used to rebuild
    /// absolute request URLs (cache keys) and sent as `X-Forwarded-Proto`.
    pub public_scheme: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 2 * 1024 * 1024, // 2MB
            public_scheme: "https".to_string(),
        }
    }
}

/// The origin pair. Read once at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Base URL of the primary origin (e.g., "http://10.0.0.5:3000").
    pub primary_url: String,

    /// Base URL of the failover origin.
    pub failover_url: String,

    /// Deadline for a single origin exchange, body included, in milliseconds.
    pub timeout_ms: u64,

    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            primary_url: "http://127.0.0.1:3000".to_string(),
            failover_url: "http://127.0.0.1:3001".to_string(),
            timeout_ms: 10_000,
            connect_timeout_ms: 2_000,
        }
    }
}

/// A single row of the content-class policy table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CachePolicyEntry {
    /// Prefix matched against the response `Content-Type`.
    pub content_type_prefix: String,

    /// Seconds a stored response is served as fresh.
    pub fresh_secs: u64,

    /// Additional seconds a stale response may be served while revalidating.
    pub stale_serve_secs: u64,
}

impl CachePolicyEntry {
    pub fn new(prefix: &str, fresh_secs: u64, stale_serve_secs: u64) -> Self {
        Self {
            content_type_prefix: prefix.to_string(),
            fresh_secs,
            stale_serve_secs,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the response cache.
    pub enabled: bool,

    /// Maximum number of stored responses before silent eviction.
    pub max_entries: usize,

    /// Responses with larger bodies are never stored.
    pub max_body_size: usize,

    /// Ordered policy table. First prefix match wins.
    pub policies: Vec<CachePolicyEntry>,

    /// Fallback when no prefix matches.
    pub default_fresh_secs: u64,
    pub default_stale_serve_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            max_body_size: 1024 * 1024,
            policies: vec![
                CachePolicyEntry::new("text/html", 300, 3600),
                CachePolicyEntry::new("application/json", 60, 300),
                CachePolicyEntry::new("text/css", 86_400, 604_800),
                CachePolicyEntry::new("application/javascript", 86_400, 604_800),
                CachePolicyEntry::new("image/", 2_592_000, 86_400),
                CachePolicyEntry::new("font/", 31_536_000, 86_400),
                CachePolicyEntry::new("text/event-stream", 0, 0),
            ],
            default_fresh_secs: 60,
            default_stale_serve_secs: 3600,
        }
    }
}

/// Limit applied within one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TierLimit {
    /// Requests admitted per window.
    pub max_requests: u64,

    /// Window length in seconds.
    pub window_secs: u64,
}

/// A tier selected by path prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TierRule {
    pub path_prefix: String,
    #[serde(flatten)]
    pub limit: TierLimit,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Limit for every path no other tier claims.
    pub default: TierLimit,

    /// Generic API tier.
    pub api: TierRule,

    /// Authentication endpoints. Strictest tier.
    pub auth: TierRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default: TierLimit {
                max_requests: 1000,
                window_secs: 60,
            },
            api: TierRule {
                path_prefix: "/api/".to_string(),
                limit: TierLimit {
                    max_requests: 100,
                    window_secs: 60,
                },
            },
            auth: TierRule {
                path_prefix: "/api/auth/".to_string(),
                limit: TierLimit {
                    max_requests: 5,
                    window_secs: 60,
                },
            },
        }
    }
}

/// CORS preflight configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins allowed by exact match (e.g., "https://app.example.com").
    pub allowed_origins: Vec<String>,

    /// Registered parent domain; any subdomain of it is allowed.
    pub parent_domain: Option<String>,

    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,

    /// `Access-Control-Max-Age` in seconds.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            parent_domain: None,
            allowed_methods: ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: ["Content-Type", "Authorization", "X-Requested-With"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            max_age_secs: 86_400,
        }
    }
}

/// Static asset configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticAssetConfig {
    /// Enable the static asset short-circuit.
    pub enabled: bool,

    /// Reserved path prefix, e.g. "/static/".
    pub path_prefix: String,

    /// Directory backing the object store.
    pub root: Option<String>,
}

impl Default for StaticAssetConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path_prefix: "/static/".to_string(),
            root: None,
        }
    }
}

/// Connection metadata headers set by the edge network in front of us.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Header carrying the ISO country code of the client.
    pub country_header: String,

    /// Header carrying the real client IP, set by a trusted edge in front
    /// of the gateway. `None` keys clients by socket address; only set this
    /// when clients cannot reach the gateway directly.
    pub client_ip_header: Option<String>,

    /// Country code used when the header is absent.
    pub fallback_country: String,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            country_header: "cf-ipcountry".to_string(),
            client_ip_header: None,
            fallback_country: "XX".to_string(),
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Path requested on both origins.
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
            path: "/health".to_string(),
        }
    }
}

/// Where analytics events go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsSinkKind {
    Log,
    Http,
}

/// Analytics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub enabled: bool,
    pub sink: AnalyticsSinkKind,

    /// Ingestion endpoint for the `http` sink.
    pub endpoint: Option<String>,

    /// Events buffered before new ones are dropped.
    pub queue_capacity: usize,

    /// Timeout for one delivery to the sink, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sink: AnalyticsSinkKind::Log,
            endpoint: None,
            queue_capacity: 4096,
            timeout_ms: 2000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

pub const PLACEHOLDER_ADMIN_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: PLACEHOLDER_ADMIN_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Upper bound on waiting for background work at shutdown.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.cache.default_fresh_secs, 60);
        assert_eq!(config.cache.default_stale_serve_secs, 3600);
        assert_eq!(config.rate_limit.auth.limit.max_requests, 5);
    }

    #[test]
    fn test_partial_sections() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [origins]
            primary_url = "http://origin-a:8000"
            failover_url = "http://origin-b:8000"

            [rate_limit.api]
            path_prefix = "/v1/"
            max_requests = 20
            window_secs = 10

            [[cache.policies]]
            content_type_prefix = "text/plain"
            fresh_secs = 5
            stale_serve_secs = 10

            [analytics]
            sink = "http"
            endpoint = "http://collector/events"
            "#,
        )
        .unwrap();

        assert_eq!(config.origins.primary_url, "http://origin-a:8000");
        assert_eq!(config.origins.timeout_ms, 10_000);
        assert_eq!(config.rate_limit.api.limit.window_secs, 10);
        assert_eq!(config.rate_limit.auth.path_prefix, "/api/auth/");
        assert_eq!(config.cache.policies.len(), 1);
        assert_eq!(config.analytics.sink, AnalyticsSinkKind::Http);
    }
}
