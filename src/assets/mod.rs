//! Static asset adapter.
//!
//! # Data Flow
//! ```text
//! /static/app.3f2a.js
//!     → strip reserved prefix → "app.3f2a.js"
//!     → ObjectStore::get
//!     → 200 (immutable) | 304 (If-None-Match) | fall through to cache/origin
//! ```
//!
//! # Design Decisions
//! - Assets are an optimization: store errors and misses fall through
//! - Keys are content-addressed, so responses are cacheable forever

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::StatusCode;
use axum::response::Response;

use crate::config::StaticAssetConfig;
use crate::store::{FsObjectStore, ObjectStore, StoredObject};

pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub struct StaticAssets {
    prefix: String,
    store: Arc<dyn ObjectStore>,
}

impl StaticAssets {
    pub fn new(prefix: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            prefix: prefix.into(),
            store,
        }
    }

    /// Filesystem-backed adapter, or `None` when static serving is off.
    pub fn from_config(config: &StaticAssetConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let root = config.root.as_ref()?;
        tracing::info!(prefix = %config.path_prefix, root = %root, "Static assets enabled");
        Some(Self::new(
            config.path_prefix.clone(),
            Arc::new(FsObjectStore::new(root)),
        ))
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    /// Serve `path` from the object store. `None` means "not here, fall through".
    pub async fn serve(&self, path: &str, request_headers: &HeaderMap) -> Option<Response> {
        let key = path.strip_prefix(&self.prefix)?;
        let object = match self.store.get(key).await {
            Ok(Some(object)) => object,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(key, error = %e, "Static asset lookup failed, falling through");
                return None;
            }
        };

        let etag = object.etag();
        if if_none_match_hits(request_headers, &etag) {
            return Some(not_modified(&etag));
        }
        Some(asset_response(object, &etag))
    }
}

fn if_none_match_hits(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().trim_start_matches("W/"))
        .any(|t| t == "*" || t == etag)
}

fn not_modified(etag: &str) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NOT_MODIFIED;
    set_cache_headers(response.headers_mut(), etag);
    response
}

fn asset_response(object: StoredObject, etag: &str) -> Response {
    let content_type = object
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    let mut response = Response::new(Body::from(object.body));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    set_cache_headers(headers, etag);
    response
}

fn set_cache_headers(headers: &mut HeaderMap, etag: &str) {
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(IMMUTABLE_CACHE_CONTROL));
    if let Ok(value) = HeaderValue::from_str(etag) {
        headers.insert(header::ETAG, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;
    use http_body_util::BodyExt;

    fn assets() -> StaticAssets {
        let store = MemoryObjectStore::new();
        store.insert("app.js", "console.log(1)", Some("application/javascript"));
        store.insert("blob.bin", vec![0u8, 1, 2], None);
        StaticAssets::new("/static/", Arc::new(store))
    }

    #[tokio::test]
    async fn test_serves_with_immutable_headers() {
        let response = assets().serve("/static/app.js", &HeaderMap::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/javascript");
        assert_eq!(response.headers()[header::CACHE_CONTROL], IMMUTABLE_CACHE_CONTROL);
        let etag = response.headers()[header::ETAG].to_str().unwrap().to_string();
        assert!(etag.starts_with('"') && etag.len() == 66);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"console.log(1)");
    }

    #[tokio::test]
    async fn test_default_content_type() {
        let response = assets().serve("/static/blob.bin", &HeaderMap::new()).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], DEFAULT_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_missing_and_invalid_fall_through() {
        let assets = assets();
        assert!(assets.serve("/static/nope.css", &HeaderMap::new()).await.is_none());
        assert!(assets.serve("/static/../secret", &HeaderMap::new()).await.is_none());
        assert!(assets.serve("/other/app.js", &HeaderMap::new()).await.is_none());
    }

    #[tokio::test]
    async fn test_if_none_match_returns_304() {
        let assets = assets();
        let first = assets.serve("/static/app.js", &HeaderMap::new()).await.unwrap();
        let etag = first.headers()[header::ETAG].clone();

        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, etag.clone());
        let second = assets.serve("/static/app.js", &headers).await.unwrap();
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(second.headers()[header::ETAG], etag);
    }

    #[test]
    fn test_prefix_matching() {
        let assets = assets();
        assert!(assets.matches("/static/a.css"));
        assert!(!assets.matches("/statics/a.css"));
    }
}
