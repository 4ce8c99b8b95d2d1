//! Cache key normalization.
//!
//! # Design Decisions
//! - Keys exist only for GET and HEAD, so unsafe methods can never reach the cache
//! - Scheme and host are lowercased, default ports and fragments dropped
//! - Query pairs are sorted so parameter order does not split entries

use std::fmt;

use axum::http::Method;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build the key for a request, or `None` if the method is never cached.
    pub fn for_request(method: &Method, url: &Url) -> Option<Self> {
        if !is_cacheable_method(method) {
            return None;
        }
        Some(Self(normalize_url(url)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn is_cacheable_method(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

/// Canonical absolute form of `url`.
pub fn normalize_url(url: &Url) -> String {
    // `Url` already lowercases scheme/host and drops default ports.
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    if normalized.query().is_some() {
        let mut pairs: Vec<(String, String)> = normalized
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if pairs.is_empty() {
            normalized.set_query(None);
        } else {
            pairs.sort();
            normalized.query_pairs_mut().clear().extend_pairs(pairs);
        }
    }

    normalized.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(method: Method, url: &str) -> Option<String> {
        CacheKey::for_request(&method, &Url::parse(url).unwrap()).map(|k| k.to_string())
    }

    #[test]
    fn test_unsafe_methods_have_no_key() {
        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            assert!(key(method, "https://example.com/a").is_none());
        }
        assert!(key(Method::HEAD, "https://example.com/a").is_some());
    }

    #[test]
    fn test_normalization() {
        assert_eq!(
            key(Method::GET, "HTTPS://Example.COM:443/a/b?z=1&a=2#frag").unwrap(),
            "https://example.com/a/b?a=2&z=1"
        );
        assert_eq!(
            key(Method::GET, "http://example.com:8080/?").unwrap(),
            "http://example.com:8080/"
        );
    }

    #[test]
    fn test_query_order_does_not_matter() {
        assert_eq!(
            key(Method::GET, "https://example.com/s?b=2&a=1"),
            key(Method::GET, "https://example.com/s?a=1&b=2")
        );
    }

    #[test]
    fn test_path_case_is_preserved() {
        assert_ne!(
            key(Method::GET, "https://example.com/Docs"),
            key(Method::GET, "https://example.com/docs")
        );
    }
}
