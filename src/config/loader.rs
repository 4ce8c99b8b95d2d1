//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

pub const ENV_ORIGIN_URL: &str = "GATEWAY_ORIGIN_URL";
pub const ENV_FAILOVER_URL: &str = "GATEWAY_FAILOVER_URL";
pub const ENV_BIND_ADDRESS: &str = "GATEWAY_BIND_ADDRESS";
pub const ENV_ADMIN_KEY: &str = "GATEWAY_ADMIN_KEY";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// Environment overrides are applied after parsing and before validation.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GatewayConfig = toml::from_str(&content)?;
    finalize(config, |key| std::env::var(key).ok())
}

/// Build a config from defaults plus environment, for running without a file.
pub fn load_from_env() -> Result<GatewayConfig, ConfigError> {
    finalize(GatewayConfig::default(), |key| std::env::var(key).ok())
}

fn finalize(
    mut config: GatewayConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<GatewayConfig, ConfigError> {
    apply_env_overrides(&mut config, env);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply process-environment overrides for deploy-time settings.
pub fn apply_env_overrides(config: &mut GatewayConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(url) = env(ENV_ORIGIN_URL) {
        config.origins.primary_url = url;
    }
    if let Some(url) = env(ENV_FAILOVER_URL) {
        config.origins.failover_url = url;
    }
    if let Some(addr) = env(ENV_BIND_ADDRESS) {
        config.listener.bind_address = addr;
    }
    if let Some(key) = env(ENV_ADMIN_KEY) {
        config.admin.api_key = key;
    }
}
