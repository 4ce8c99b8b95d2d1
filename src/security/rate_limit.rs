//! Fixed-window rate limiting with path-based tiers.
//!
//! # Design Decisions
//! - Counters live in the shared [`KvStore`]; read-then-write, no CAS.
//!   Racing requests at the boundary may admit a few extra requests.
//! - A counter key names its window, so rollover is a new key, never a reset
//! - Keys expire after two windows to tolerate clock skew
//! - A failing counter store admits the request (fail open)

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::{HeaderMap, HeaderValue};
use bytes::Bytes;

use crate::config::{RateLimitConfig, TierLimit};
use crate::observability::metrics;
use crate::store::KvStore;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Default,
    Api,
    Auth,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Default => "default",
            Tier::Api => "api",
            Tier::Auth => "auth",
        }
    }
}

/// Details of a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub tier: Tier,
    pub limit: u64,
    pub retry_after_secs: u64,
    /// Unix seconds at which the current window ends.
    pub reset_at: u64,
}

impl Rejection {
    /// Write `Retry-After` and the `X-RateLimit-*` headers.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(
            axum::http::header::RETRY_AFTER,
            HeaderValue::from(self.retry_after_secs),
        );
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from_static("0"));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset_at));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Reject(Rejection),
}

/// Admission control backed by approximate shared counters.
pub struct RateLimiter {
    enabled: bool,
    /// Prefix rules, longest prefix first.
    rules: Vec<(String, Tier, TierLimit)>,
    default: TierLimit,
    store: Arc<dyn KvStore>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, store: Arc<dyn KvStore>) -> Self {
        let mut rules = vec![
            (config.api.path_prefix.clone(), Tier::Api, config.api.limit),
            (config.auth.path_prefix.clone(), Tier::Auth, config.auth.limit),
        ];
        rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self {
            enabled: config.enabled,
            rules,
            default: config.default,
            store,
        }
    }

    /// Longest-prefix tier match for `path`.
    pub fn resolve_tier(&self, path: &str) -> (Tier, TierLimit) {
        self.rules
            .iter()
            .find(|(prefix, _, _)| path.starts_with(prefix.as_str()))
            .map(|(_, tier, limit)| (*tier, *limit))
            .unwrap_or((Tier::Default, self.default))
    }

    pub async fn admit(&self, client_identity: &str, path: &str) -> Admission {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.admit_at(client_identity, path, now).await
    }

    /// Same as [`RateLimiter::admit`] with an explicit clock (Unix seconds).
    pub async fn admit_at(&self, client_identity: &str, path: &str, now_secs: u64) -> Admission {
        if !self.enabled {
            return Admission::Allow;
        }
        let (tier, limit) = self.resolve_tier(path);
        let window_index = now_secs / limit.window_secs;
        let key = window_key(client_identity, tier, window_index);

        let count = match self.store.get(&key).await {
            Ok(value) => value.as_deref().and_then(parse_count).unwrap_or(0),
            Err(e) => {
                tracing::warn!(error = %e, tier = tier.as_str(), "Counter store read failed, admitting");
                return Admission::Allow;
            }
        };

        if count >= limit.max_requests {
            metrics::record_rate_limited(tier.as_str());
            tracing::warn!(client = %client_identity, tier = tier.as_str(), count, "Rate limit exceeded");
            return Admission::Reject(Rejection {
                tier,
                limit: limit.max_requests,
                retry_after_secs: limit.window_secs,
                reset_at: (window_index + 1) * limit.window_secs,
            });
        }

        let ttl = Duration::from_secs(limit.window_secs * 2);
        let next = Bytes::from((count + 1).to_string());
        if let Err(e) = self.store.put(&key, next, Some(ttl)).await {
            tracing::warn!(error = %e, tier = tier.as_str(), "Counter store write failed");
        }
        Admission::Allow
    }
}

/// Store key for one client, tier, and window.
pub fn window_key(client_identity: &str, tier: Tier, window_index: u64) -> String {
    format!("rl:{}:{}:{}", tier.as_str(), client_identity, window_index)
}

fn parse_count(raw: &[u8]) -> Option<u64> {
    std::str::from_utf8(raw).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierRule;
    use crate::store::{MemoryKvStore, StoreError};
    use async_trait::async_trait;

    fn config() -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            default: TierLimit { max_requests: 10, window_secs: 60 },
            api: TierRule {
                path_prefix: "/api/".into(),
                limit: TierLimit { max_requests: 5, window_secs: 60 },
            },
            auth: TierRule {
                path_prefix: "/api/auth/".into(),
                limit: TierLimit { max_requests: 3, window_secs: 30 },
            },
        }
    }

    fn limiter() -> RateLimiter {
        RateLimiter::new(&config(), Arc::new(MemoryKvStore::new(1024)))
    }

    #[test]
    fn test_longest_prefix_wins() {
        let limiter = limiter();
        assert_eq!(limiter.resolve_tier("/api/auth/login").0, Tier::Auth);
        assert_eq!(limiter.resolve_tier("/api/users").0, Tier::Api);
        assert_eq!(limiter.resolve_tier("/about").0, Tier::Default);
    }

    #[tokio::test]
    async fn test_limit_plus_one_is_rejected() {
        let limiter = limiter();
        let now = 1_700_000_010;
        for _ in 0..3 {
            assert_eq!(limiter.admit_at("1.2.3.4", "/api/auth/login", now).await, Admission::Allow);
        }
        match limiter.admit_at("1.2.3.4", "/api/auth/login", now).await {
            Admission::Reject(rejection) => {
                assert_eq!(rejection.tier, Tier::Auth);
                assert_eq!(rejection.limit, 3);
                assert_eq!(rejection.retry_after_secs, 30);
                assert_eq!(rejection.reset_at, (now / 30 + 1) * 30);
            }
            Admission::Allow => panic!("fourth request should be rejected"),
        }
        // Other clients and tiers are unaffected.
        assert_eq!(limiter.admit_at("5.6.7.8", "/api/auth/login", now).await, Admission::Allow);
        assert_eq!(limiter.admit_at("1.2.3.4", "/home", now).await, Admission::Allow);
    }

    #[tokio::test]
    async fn test_window_rollover_starts_fresh() {
        let limiter = limiter();
        let now = 1_700_000_000;
        for _ in 0..3 {
            limiter.admit_at("c", "/api/auth/x", now).await;
        }
        assert!(matches!(limiter.admit_at("c", "/api/auth/x", now).await, Admission::Reject(_)));
        assert_eq!(limiter.admit_at("c", "/api/auth/x", now + 30).await, Admission::Allow);
    }

    #[tokio::test]
    async fn test_disabled_always_allows() {
        let mut cfg = config();
        cfg.enabled = false;
        let limiter = RateLimiter::new(&cfg, Arc::new(MemoryKvStore::new(16)));
        for _ in 0..20 {
            assert_eq!(limiter.admit_at("c", "/api/auth/x", 0).await, Admission::Allow);
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl KvStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<Bytes>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn put(&self, _key: &str, _value: Bytes, _ttl: Option<Duration>) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let limiter = RateLimiter::new(&config(), Arc::new(BrokenStore));
        assert_eq!(limiter.admit_at("c", "/api/auth/x", 0).await, Admission::Allow);
    }

    #[test]
    fn test_rejection_headers() {
        let mut headers = HeaderMap::new();
        Rejection {
            tier: Tier::Api,
            limit: 100,
            retry_after_secs: 60,
            reset_at: 1_700_000_040,
        }
        .apply_headers(&mut headers);
        assert_eq!(headers["retry-after"], "60");
        assert_eq!(headers[X_RATELIMIT_LIMIT], "100");
        assert_eq!(headers[X_RATELIMIT_REMAINING], "0");
        assert_eq!(headers[X_RATELIMIT_RESET], "1700000040");
    }

    #[test]
    fn test_window_key_shape() {
        assert_eq!(window_key("9.9.9.9", Tier::Api, 42), "rl:api:9.9.9.9:42");
    }
}
