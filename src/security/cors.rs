//! CORS preflight handling.
//!
//! An origin is allowed when it is on the exact allow-list, or when its host
//! is the registered parent domain or one of its subdomains.

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::response::Response;
use url::Url;

use crate::config::CorsConfig;

pub struct CorsPolicy {
    allowed_origins: Vec<String>,
    parent_domain: Option<String>,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    max_age: HeaderValue,
}

impl CorsPolicy {
    pub fn new(config: &CorsConfig) -> Self {
        let join = |items: &[String]| {
            HeaderValue::from_str(&items.join(", ")).unwrap_or_else(|_| HeaderValue::from_static(""))
        };
        Self {
            allowed_origins: config
                .allowed_origins
                .iter()
                .map(|o| o.trim_end_matches('/').to_ascii_lowercase())
                .collect(),
            parent_domain: config
                .parent_domain
                .as_ref()
                .map(|d| d.trim_start_matches('.').to_ascii_lowercase()),
            allow_methods: join(&config.allowed_methods),
            allow_headers: join(&config.allowed_headers),
            max_age: HeaderValue::from(config.max_age_secs),
        }
    }

    /// Every `OPTIONS` request is answered as a preflight.
    pub fn is_preflight(method: &Method) -> bool {
        method == Method::OPTIONS
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        let normalized = origin.trim_end_matches('/').to_ascii_lowercase();
        if self.allowed_origins.iter().any(|o| *o == normalized) {
            return true;
        }
        let Some(parent) = &self.parent_domain else {
            return false;
        };
        let Ok(url) = Url::parse(&normalized) else {
            return false;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        match url.host_str() {
            Some(host) => host == parent || host.ends_with(&format!(".{}", parent)),
            None => false,
        }
    }

    /// Answer a preflight: 204 with the origin echoed back, or a bare 403.
    pub fn preflight(&self, headers: &HeaderMap) -> Response {
        let origin = headers
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .filter(|o| self.is_allowed(o));

        let Some(origin) = origin else {
            tracing::debug!(origin = ?headers.get(header::ORIGIN), "CORS preflight rejected");
            return status_only(StatusCode::FORBIDDEN);
        };

        let mut response = status_only(StatusCode::NO_CONTENT);
        let out = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(origin) {
            out.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        out.insert(header::ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        out.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
        out.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
        out.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        out.insert(header::VARY, HeaderValue::from_static("Origin"));
        response
    }

    /// Echo an allowed `Origin` on a non-preflight response.
    pub fn apply_to_response(&self, request_origin: Option<&str>, headers: &mut HeaderMap) {
        let Some(origin) = request_origin.filter(|o| self.is_allowed(o)) else {
            return;
        };
        if let Ok(value) = HeaderValue::from_str(origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
        }
    }
}

fn status_only(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}
