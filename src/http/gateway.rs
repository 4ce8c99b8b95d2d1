//! Per-request orchestration.
//!
//! # Data Flow
//! ```text
//! request
//!   → OPTIONS?          CORS preflight 204 | 403 (stop)
//!   → rate limit        429 + Retry-After (stop)
//!   → geo tag
//!   → static prefix?    object store hit (stop) | fall through
//!   → cache lookup      HIT | STALE (+ background revalidation) (stop)
//!   → origin fetch      primary, then failover
//!   → background cache store (GET 2xx, policy allows)
//!   → analytics emit, security headers
//! any error or panic → 503 fallback page
//! ```
//!
//! # Design Decisions
//! - The only client-visible failure is the static fallback page
//!   (plus 413/400 for requests that are malformed on arrival)
//! - Cache writes and revalidations never delay the response

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{self, HeaderValue};
use axum::http::{Method, Request, Response, StatusCode};
use futures_util::FutureExt;

use crate::assets::StaticAssets;
use crate::cache::{
    is_cacheable_method, response_storage_rejection, CacheKey, CacheLookup, CacheManager, CachePolicy,
    CachePolicyTable, RevalidationClaim, X_CACHE,
};
use crate::config::GatewayConfig;
use crate::http::request::{client_ip, country_code, RequestDescriptor, X_REQUEST_ID};
use crate::http::response::{client_error, fallback_response, rate_limited_response};
use crate::lifecycle::BackgroundTasks;
use crate::observability::{metrics, AnalyticsEmitter, AnalyticsEvent, EventKind};
use crate::security::{apply_security_headers, Admission, CorsPolicy, RateLimiter};
use crate::store::KvStore;
use crate::upstream::{FetchError, OriginFetcher, OriginResponse};

/// Failures that end request processing early.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("all origins unavailable: {0}")]
    OriginsUnavailable(#[from] FetchError),

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Which branch produced the response. Used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Preflight,
    RateLimited,
    Static,
    CacheHit,
    CacheStale,
    Origin,
    Rejected,
    Fallback,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Preflight => "preflight",
            Outcome::RateLimited => "rate_limited",
            Outcome::Static => "static",
            Outcome::CacheHit => "cache_hit",
            Outcome::CacheStale => "cache_stale",
            Outcome::Origin => "origin",
            Outcome::Rejected => "rejected",
            Outcome::Fallback => "fallback",
        }
    }
}

/// Everything a request needs, shared across all requests.
pub struct Gateway {
    config: Arc<GatewayConfig>,
    cors: CorsPolicy,
    rate_limiter: RateLimiter,
    assets: Option<StaticAssets>,
    cache: Arc<CacheManager>,
    policies: CachePolicyTable,
    fetcher: OriginFetcher,
    analytics: AnalyticsEmitter,
    background: BackgroundTasks,
}

impl Gateway {
    pub fn new(
        config: Arc<GatewayConfig>,
        counters: Arc<dyn KvStore>,
        cache: Arc<CacheManager>,
        analytics: AnalyticsEmitter,
        background: BackgroundTasks,
    ) -> Self {
        Self {
            cors: CorsPolicy::new(&config.cors),
            rate_limiter: RateLimiter::new(&config.rate_limit, counters),
            assets: StaticAssets::from_config(&config.static_assets),
            policies: CachePolicyTable::from_config(&config.cache),
            fetcher: OriginFetcher::new(&config.origins, config.listener.public_scheme.clone()),
            cache,
            analytics,
            background,
            config,
        }
    }

    /// Replace the static asset adapter (tests and embedded stores).
    pub fn with_assets(mut self, assets: StaticAssets) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Produce a response for `request`. Never fails.
    pub async fn handle(self: &Arc<Self>, request: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let request_origin = request
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let event_base = EventBase::from_parts(&request, &self.config);

        let result = AssertUnwindSafe(self.process(request, start)).catch_unwind().await;
        let (mut response, outcome) = match result {
            Ok(Ok(served)) => served,
            Ok(Err(GatewayError::PayloadTooLarge(limit))) => {
                tracing::warn!(request_id = %event_base.request_id, limit, "Request body too large");
                (
                    client_error(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"),
                    Outcome::Rejected,
                )
            }
            Ok(Err(GatewayError::InvalidRequest(message))) => {
                tracing::warn!(request_id = %event_base.request_id, %message, "Invalid request");
                (client_error(StatusCode::BAD_REQUEST, "bad request"), Outcome::Rejected)
            }
            Ok(Err(e)) => {
                tracing::error!(request_id = %event_base.request_id, error = %e, "Serving fallback page");
                self.emit(&event_base, EventKind::Error, start, Some(503));
                (fallback_response(), Outcome::Fallback)
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(request_id = %event_base.request_id, panic = %message, "Request handler panicked");
                self.emit(&event_base, EventKind::Error, start, Some(503));
                (fallback_response(), Outcome::Fallback)
            }
        };

        if outcome != Outcome::Preflight {
            self.cors
                .apply_to_response(request_origin.as_deref(), response.headers_mut());
        }
        apply_security_headers(response.headers_mut());

        metrics::record_request(outcome.as_str(), response.status().as_u16(), start);
        tracing::debug!(
            request_id = %event_base.request_id,
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            outcome = outcome.as_str(),
            "Request completed"
        );
        response
    }

    async fn process(
        self: &Arc<Self>,
        request: Request<Body>,
        start: Instant,
    ) -> Result<(Response<Body>, Outcome), GatewayError> {
        if CorsPolicy::is_preflight(request.method()) {
            return Ok((self.cors.preflight(request.headers()), Outcome::Preflight));
        }

        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let identity = client_ip(request.headers(), peer, &self.config.geo);
        let path = request.uri().path().to_string();
        if let Admission::Reject(rejection) = self.rate_limiter.admit(&identity, &path).await {
            let base = EventBase::from_parts(&request, &self.config);
            self.emit(&base, EventKind::RateLimited, start, Some(429));
            return Ok((rate_limited_response(&rejection), Outcome::RateLimited));
        }

        let mut request = RequestDescriptor::from_request(
            request,
            &self.config.listener.public_scheme,
            &self.config.geo,
            self.config.listener.max_body_size,
        )
        .await?;
        request.tag_country(&self.config.geo);
        let head_only = request.method == Method::HEAD;
        // Responses to credentialed requests are per-user; keep them out of the shared cache.
        let cache_key = if request.headers.contains_key(header::AUTHORIZATION) {
            None
        } else {
            CacheKey::for_request(&request.method, &request.url)
        };

        if let Some(assets) = &self.assets {
            if is_cacheable_method(&request.method) && assets.matches(request.path()) {
                if let Some(mut response) = assets.serve(request.path(), &request.headers).await {
                    if head_only {
                        *response.body_mut() = Body::empty();
                    }
                    self.emit_for(&request, EventKind::CacheHit, start, Some(response.status().as_u16()));
                    return Ok((response, Outcome::Static));
                }
            }
        }

        if let Some(key) = &cache_key {
            match self.cache.lookup(key) {
                CacheLookup::Fresh(entry) => {
                    self.emit_for(&request, EventKind::CacheHit, start, Some(entry.status.as_u16()));
                    return Ok((entry.to_response("HIT", head_only), Outcome::CacheHit));
                }
                CacheLookup::Stale(entry) => {
                    self.schedule_revalidation(key.clone(), &request);
                    self.emit_for(&request, EventKind::CacheHit, start, Some(entry.status.as_u16()));
                    return Ok((entry.to_response("STALE", head_only), Outcome::CacheStale));
                }
                CacheLookup::Miss => {}
            }
        }

        let mut origin = self.fetcher.forward(&request).await?;
        tracing::debug!(
            request_id = %request.request_id,
            origin = origin.origin.as_str(),
            status = %origin.status,
            latency_ms = origin.latency.as_millis() as u64,
            "Served from origin"
        );

        if request.method == Method::GET {
            if let Some(key) = &cache_key {
                self.schedule_store(key, &mut origin);
            }
        }
        if cache_key.is_some() {
            origin.headers.insert(X_CACHE, HeaderValue::from_static("MISS"));
        }

        let status = origin.status.as_u16();
        let kind = if origin.status.is_server_error() {
            EventKind::OriginError
        } else {
            EventKind::OriginSuccess
        };
        self.emit_for(&request, kind, start, Some(status));
        Ok((origin.into_response(head_only), Outcome::Origin))
    }

    /// Policy to store `origin` under, with its `Cache-Control` stamped.
    /// `None` when the response must not be shared.
    fn prepare_store(&self, origin: &mut OriginResponse) -> Option<CachePolicy> {
        if !self.cache.is_enabled() || !origin.status.is_success() {
            return None;
        }
        let content_type = origin
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let policy = self.policies.resolve(content_type);
        if !policy.allows_caching() {
            return None;
        }
        if let Some(rejection) = response_storage_rejection(&origin.headers) {
            tracing::debug!(reason = %rejection, "Response not cacheable");
            return None;
        }
        if let Ok(value) = HeaderValue::from_str(&policy.cache_control()) {
            origin.headers.insert(header::CACHE_CONTROL, value);
        }
        Some(policy)
    }

    /// Queue a cache write for a cacheable response and stamp its `Cache-Control`.
    fn schedule_store(&self, key: &CacheKey, origin: &mut OriginResponse) {
        let Some(policy) = self.prepare_store(origin) else {
            return;
        };

        let cache = self.cache.clone();
        let key = key.clone();
        let status = origin.status;
        let headers = origin.headers.clone();
        let body = origin.body.clone();
        self.background.spawn("cache_store", async move {
            cache.store(&key, status, &headers, body, policy)
        });
    }

    /// Refresh a stale entry in the background. One revalidation per key at a time.
    fn schedule_revalidation(self: &Arc<Self>, key: CacheKey, request: &RequestDescriptor) {
        let Some(claim) = self.cache.claim_revalidation(&key) else {
            return;
        };
        let refresh = revalidation_request(request);

        let gateway = Arc::clone(self);
        self.background.spawn("cache_revalidate", async move {
            gateway.revalidate(claim, refresh).await
        });
    }

    /// Fetch a fresh copy and store it before the claim is released,
    /// so no second revalidation starts while the write is pending.
    async fn revalidate(&self, claim: RevalidationClaim, refresh: RequestDescriptor) -> Result<(), GatewayError> {
        let mut origin = self.fetcher.forward(&refresh).await?;
        tracing::debug!(key = %claim.key(), status = %origin.status, "Revalidated stale entry");
        if let Some(policy) = self.prepare_store(&mut origin) {
            if let Err(rejection) =
                self.cache
                    .store(claim.key(), origin.status, &origin.headers, origin.body, policy)
            {
                tracing::debug!(key = %claim.key(), reason = %rejection, "Revalidated response not stored");
            }
        }
        Ok(())
    }

    fn emit_for(&self, request: &RequestDescriptor, kind: EventKind, start: Instant, status: Option<u16>) {
        let base = EventBase {
            path: request.path().to_string(),
            country: request.country.clone(),
            user_agent: request.user_agent().to_string(),
            request_id: request.request_id.clone(),
        };
        self.emit(&base, kind, start, status);
    }

    fn emit(&self, base: &EventBase, kind: EventKind, start: Instant, status: Option<u16>) {
        let mut event = AnalyticsEvent::now(
            kind,
            base.path.clone(),
            base.country.clone(),
            base.user_agent.clone(),
            start.elapsed(),
        )
        .with_request_id(base.request_id.clone());
        if let Some(status) = status {
            event = event.with_status(status);
        }
        self.analytics.emit(event);
    }
}

/// The anonymous GET used to refresh a shared cache entry.
fn revalidation_request(request: &RequestDescriptor) -> RequestDescriptor {
    let mut refresh = request.clone();
    refresh.method = Method::GET;
    refresh.body = Default::default();
    for name in [
        header::IF_NONE_MATCH,
        header::IF_MODIFIED_SINCE,
        header::CONTENT_LENGTH,
        header::COOKIE,
        header::AUTHORIZATION,
    ] {
        refresh.headers.remove(name);
    }
    refresh
}

/// Request fields captured for analytics before the request is consumed.
struct EventBase {
    path: String,
    country: String,
    user_agent: String,
    request_id: String,
}

impl EventBase {
    fn from_parts(request: &Request<Body>, config: &GatewayConfig) -> Self {
        let header = |name: header::HeaderName| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string()
        };
        Self {
            path: request.uri().path().to_string(),
            country: country_code(request.headers(), &config.geo),
            user_agent: header(header::USER_AGENT),
            request_id: request
                .headers()
                .get(X_REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string(),
        }
    }
}
