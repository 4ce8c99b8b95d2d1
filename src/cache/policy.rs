//! Content-class cache policies.
//!
//! Ordered table: first entry whose prefix matches the response
//! `Content-Type` wins; otherwise the default entry applies.

use std::time::Duration;

use crate::config::{CacheConfig, CachePolicyEntry};

/// Freshness rules applied to one stored response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub fresh: Duration,
    pub stale_serve: Duration,
}

impl CachePolicy {
    pub fn from_secs(fresh_secs: u64, stale_serve_secs: u64) -> Self {
        Self {
            fresh: Duration::from_secs(fresh_secs),
            stale_serve: Duration::from_secs(stale_serve_secs),
        }
    }

    /// A zero freshness window disables storage.
    pub fn allows_caching(&self) -> bool {
        !self.fresh.is_zero()
    }

    /// Total lifetime of a stored record.
    pub fn max_lifetime(&self) -> Duration {
        self.fresh + self.stale_serve
    }

    /// `Cache-Control` value synthesized for responses stored under this policy.
    pub fn cache_control(&self) -> String {
        format!(
            "public, max-age={}, stale-while-revalidate={}",
            self.fresh.as_secs(),
            self.stale_serve.as_secs()
        )
    }
}

#[derive(Debug, Clone)]
pub struct CachePolicyTable {
    entries: Vec<(String, CachePolicy)>,
    default: CachePolicy,
}

impl CachePolicyTable {
    pub fn new(entries: &[CachePolicyEntry], default: CachePolicy) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|e| {
                    (
                        e.content_type_prefix.to_ascii_lowercase(),
                        CachePolicy::from_secs(e.fresh_secs, e.stale_serve_secs),
                    )
                })
                .collect(),
            default,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            &config.policies,
            CachePolicy::from_secs(config.default_fresh_secs, config.default_stale_serve_secs),
        )
    }

    /// Resolve the policy for a `Content-Type` (absent header uses the default).
    pub fn resolve(&self, content_type: Option<&str>) -> CachePolicy {
        let Some(content_type) = content_type else {
            return self.default;
        };
        let content_type = content_type.trim().to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(prefix, _)| content_type.starts_with(prefix.as_str()))
            .map(|(_, policy)| *policy)
            .unwrap_or(self.default)
    }
}

impl Default for CachePolicyTable {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}
