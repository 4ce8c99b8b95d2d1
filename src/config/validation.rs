//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Check origin URLs and reserved prefixes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use url::Url;

use crate::config::schema::{AnalyticsSinkKind, GatewayConfig, TierLimit, PLACEHOLDER_ADMIN_KEY};

/// A single semantic problem, tagged with the offending field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_url(&config.origins.primary_url, "origins.primary_url", &["http"], &mut errors);
    check_url(&config.origins.failover_url, "origins.failover_url", &["http"], &mut errors);
    if config.origins.timeout_ms == 0 {
        errors.push(ValidationError::new("origins.timeout_ms", "must be greater than 0"));
    }
    if config.origins.connect_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "origins.connect_timeout_ms",
            "must be greater than 0",
        ));
    }

    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::new("listener.max_body_size", "must be greater than 0"));
    }
    if !matches!(config.listener.public_scheme.as_str(), "http" | "https") {
        errors.push(ValidationError::new(
            "listener.public_scheme",
            "must be \"http\" or \"https\"",
        ));
    }

    for (i, policy) in config.cache.policies.iter().enumerate() {
        if policy.content_type_prefix.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("cache.policies[{}].content_type_prefix", i),
                "must not be empty",
            ));
        }
    }
    if config.cache.enabled && config.cache.max_entries == 0 {
        errors.push(ValidationError::new("cache.max_entries", "must be greater than 0"));
    }

    if config.rate_limit.enabled {
        check_tier(&config.rate_limit.default, "rate_limit.default", &mut errors);
        check_tier(&config.rate_limit.api.limit, "rate_limit.api", &mut errors);
        check_tier(&config.rate_limit.auth.limit, "rate_limit.auth", &mut errors);
        for (name, rule) in [("api", &config.rate_limit.api), ("auth", &config.rate_limit.auth)] {
            if !rule.path_prefix.starts_with('/') {
                errors.push(ValidationError::new(
                    format!("rate_limit.{}.path_prefix", name),
                    "must start with '/'",
                ));
            }
        }
    }

    if config.static_assets.enabled {
        let prefix = &config.static_assets.path_prefix;
        if !prefix.starts_with('/') || !prefix.ends_with('/') || prefix.len() < 3 {
            errors.push(ValidationError::new(
                "static_assets.path_prefix",
                "must start and end with '/' and name a directory",
            ));
        }
        if config.static_assets.root.is_none() {
            errors.push(ValidationError::new(
                "static_assets.root",
                "required when static assets are enabled",
            ));
        }
    }

    if config.health_check.enabled {
        if config.health_check.interval_secs == 0 {
            errors.push(ValidationError::new(
                "health_check.interval_secs",
                "must be greater than 0",
            ));
        }
        if config.health_check.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "health_check.timeout_secs",
                "must be greater than 0",
            ));
        }
        if !config.health_check.path.starts_with('/') {
            errors.push(ValidationError::new("health_check.path", "must start with '/'"));
        }
    }

    if config.analytics.enabled {
        if config.analytics.queue_capacity == 0 {
            errors.push(ValidationError::new(
                "analytics.queue_capacity",
                "must be greater than 0",
            ));
        }
        if config.analytics.sink == AnalyticsSinkKind::Http {
            match config.analytics.endpoint.as_deref() {
                None => errors.push(ValidationError::new(
                    "analytics.endpoint",
                    "required for the http sink",
                )),
                Some(endpoint) => {
                    check_url(endpoint, "analytics.endpoint", &["http", "https"], &mut errors)
                }
            }
        }
    }

    if config.admin.enabled && (config.admin.api_key.is_empty() || config.admin.api_key == PLACEHOLDER_ADMIN_KEY) {
        errors.push(ValidationError::new(
            "admin.api_key",
            "must be set to a non-placeholder value when admin is enabled",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Origins are reached over plain HTTP; TLS terminates in front of them.
fn check_url(value: &str, field: &str, schemes: &[&str], errors: &mut Vec<ValidationError>) {
    match Url::parse(value) {
        Ok(url) if schemes.contains(&url.scheme()) && url.host_str().is_some() => {}
        Ok(_) => errors.push(ValidationError::new(
            field,
            format!("must be a {} URL with a host", schemes.join("/")),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {}", e))),
    }
}

fn check_tier(limit: &TierLimit, field: &str, errors: &mut Vec<ValidationError>) {
    if limit.max_requests == 0 {
        errors.push(ValidationError::new(
            format!("{}.max_requests", field),
            "must be greater than 0",
        ));
    }
    if limit.window_secs == 0 {
        errors.push(ValidationError::new(
            format!("{}.window_secs", field),
            "must be greater than 0",
        ));
    }
}
