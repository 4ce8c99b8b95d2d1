//! Response cache keyed by normalized URL.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Response, StatusCode};
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use serde::Serialize;

use crate::cache::key::CacheKey;
use crate::cache::policy::CachePolicy;
use crate::config::CacheConfig;
use crate::observability::metrics;

pub const X_CACHE: &str = "x-cache";

/// A stored origin response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub stored_at: Instant,
    pub policy: CachePolicy,
}

impl CachedResponse {
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    pub fn is_fresh(&self) -> bool {
        self.age() < self.policy.fresh
    }

    fn is_expired(&self) -> bool {
        self.age() >= self.policy.max_lifetime()
    }

    /// Render for the client. `head_only` drops the body for HEAD requests.
    pub fn to_response(&self, cache_status: &'static str, head_only: bool) -> Response<Body> {
        let body = if head_only {
            Body::empty()
        } else {
            Body::from(self.body.clone())
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.clone();
        let headers = response.headers_mut();
        headers.insert(X_CACHE, HeaderValue::from_static(cache_status));
        headers.insert(header::AGE, HeaderValue::from(self.age().as_secs()));
        response
    }
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Fresh(Arc<CachedResponse>),
    /// Past its freshness window but inside the stale-serve window.
    Stale(Arc<CachedResponse>),
    Miss,
}

/// Why a response was not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StoreRejection {
    #[error("cache disabled")]
    Disabled,
    #[error("status is not 2xx")]
    NotSuccess,
    #[error("policy has a zero freshness window")]
    PolicyForbids,
    #[error("origin sent no-store or private")]
    OriginForbids,
    #[error("response sets a cookie")]
    SetsCookie,
    #[error("response varies on request headers")]
    Varies,
    #[error("body exceeds the cacheable size")]
    TooLarge,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
    pub entries: usize,
    pub max_entries: usize,
}

/// Request-keyed response cache with content-class TTLs.
///
/// Concurrent stores to the same key race with last-write-wins.
/// Records may be evicted at any time; a miss is always safe.
#[derive(Debug)]
pub struct CacheManager {
    entries: DashMap<String, Arc<CachedResponse>>,
    revalidating: DashSet<String>,
    enabled: bool,
    max_entries: usize,
    max_body_size: usize,
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    evictions: AtomicU64,
}

impl CacheManager {
    pub fn new(config: &CacheConfig) -> Self {
        tracing::info!(
            enabled = config.enabled,
            max_entries = config.max_entries,
            policies = config.policies.len(),
            "Response cache initialized"
        );
        Self {
            entries: DashMap::new(),
            revalidating: DashSet::new(),
            enabled: config.enabled,
            max_entries: config.max_entries.max(1),
            max_body_size: config.max_body_size,
            hits: AtomicU64::new(0),
            stale_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stores: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn lookup(&self, key: &CacheKey) -> CacheLookup {
        if !self.enabled {
            return CacheLookup::Miss;
        }
        let found = self.entries.get(key.as_str()).map(|r| r.value().clone());
        let result = match found {
            Some(entry) if entry.is_fresh() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Fresh(entry)
            }
            Some(entry) if !entry.is_expired() => {
                self.stale_hits.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Stale(entry)
            }
            Some(_) => {
                self.entries
                    .remove_if(key.as_str(), |_, entry| entry.is_expired());
                self.misses.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Miss
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Miss
            }
        };
        metrics::record_cache_lookup(match &result {
            CacheLookup::Fresh(_) => "hit",
            CacheLookup::Stale(_) => "stale",
            CacheLookup::Miss => "miss",
        });
        result
    }

    /// Store a response. Replaces any existing record for the key.
    pub fn store(
        &self,
        key: &CacheKey,
        status: StatusCode,
        headers: &HeaderMap,
        body: Bytes,
        policy: CachePolicy,
    ) -> Result<(), StoreRejection> {
        if !self.enabled {
            return Err(StoreRejection::Disabled);
        }
        if !status.is_success() {
            return Err(StoreRejection::NotSuccess);
        }
        if !policy.allows_caching() {
            return Err(StoreRejection::PolicyForbids);
        }
        if let Some(rejection) = response_storage_rejection(headers) {
            return Err(rejection);
        }
        if body.len() > self.max_body_size {
            return Err(StoreRejection::TooLarge);
        }

        if !self.entries.contains_key(key.as_str()) {
            self.make_room();
        }
        let record = CachedResponse {
            status,
            headers: headers.clone(),
            body,
            stored_at: Instant::now(),
            policy,
        };
        self.entries.insert(key.as_str().to_string(), Arc::new(record));
        self.stores.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Claim the right to revalidate `key`. Only one claim per key at a time.
    pub fn begin_revalidation(&self, key: &CacheKey) -> bool {
        self.revalidating.insert(key.as_str().to_string())
    }

    pub fn end_revalidation(&self, key: &CacheKey) {
        self.revalidating.remove(key.as_str());
    }

    /// Like [`CacheManager::begin_revalidation`], released when the claim drops.
    pub fn claim_revalidation(self: &Arc<Self>, key: &CacheKey) -> Option<RevalidationClaim> {
        if !self.begin_revalidation(key) {
            return None;
        }
        Some(RevalidationClaim {
            cache: Arc::clone(self),
            key: key.clone(),
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.entries.len(),
            max_entries: self.max_entries,
        }
    }

    fn make_room(&self) {
        if self.entries.len() < self.max_entries {
            return;
        }
        self.entries.retain(|_, entry| !entry.is_expired());
        while self.entries.len() >= self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|r| r.value().stored_at)
                .map(|r| r.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }
}

/// Exclusive right to refresh one stale key. Dropping it, even while
/// unwinding, lets the next stale hit try again.
#[derive(Debug)]
pub struct RevalidationClaim {
    cache: Arc<CacheManager>,
    key: CacheKey,
}

impl RevalidationClaim {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl Drop for RevalidationClaim {
    fn drop(&mut self) {
        self.cache.end_revalidation(&self.key);
    }
}

/// Why an origin response must not be shared between clients, if it must not.
///
/// Rejects `no-store`/`private`, any `Set-Cookie`, and a `Vary` on anything
/// other than `Origin` (the key does not include request headers).
pub fn response_storage_rejection(headers: &HeaderMap) -> Option<StoreRejection> {
    let forbids = header_tokens(headers, header::CACHE_CONTROL)
        .any(|d| d == "no-store" || d == "private" || d.starts_with("private="));
    if forbids {
        return Some(StoreRejection::OriginForbids);
    }
    if headers.contains_key(header::SET_COOKIE) {
        return Some(StoreRejection::SetsCookie);
    }
    if header_tokens(headers, header::VARY).any(|v| v != "origin") {
        return Some(StoreRejection::Varies);
    }
    None
}

fn header_tokens(headers: &HeaderMap, name: header::HeaderName) -> impl Iterator<Item = String> + '_ {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|d| d.trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
}
