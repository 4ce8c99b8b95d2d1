//! End-to-end tests for CORS, rate limiting and response hardening.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Response;

use edge_gateway::assets::StaticAssets;
use edge_gateway::config::TierLimit;
use edge_gateway::store::{ObjectStore, StoreError, StoredObject};

mod common;

#[tokio::test]
async fn test_preflight_from_allowed_subdomain() {
    let primary = common::start_origin(200, "text/plain", "origin").await;
    let failover = common::start_origin(200, "text/plain", "origin").await;
    let gateway = common::start_gateway(common::gateway_config(&primary.url(), &failover.url())).await;

    let res = common::client()
        .request(reqwest::Method::OPTIONS, gateway.url("/api/cart"))
        .header("origin", "https://shop.example.com")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 204);
    assert_eq!(res.headers()["access-control-allow-origin"], "https://shop.example.com");
    assert_eq!(res.headers()["access-control-allow-credentials"], "true");
    assert_eq!(res.headers()["access-control-max-age"], "86400");
    assert!(res.headers()["access-control-allow-methods"]
        .to_str()
        .unwrap()
        .contains("POST"));
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    assert_eq!(primary.hits(), 0);
}

#[tokio::test]
async fn test_preflight_from_unknown_origin_is_forbidden() {
    let primary = common::start_origin(200, "text/plain", "origin").await;
    let failover = common::start_origin(200, "text/plain", "origin").await;
    let gateway = common::start_gateway(common::gateway_config(&primary.url(), &failover.url())).await;
    let client = common::client();

    for origin in ["https://evil.com", "https://example.com.evil.com"] {
        let res = client
            .request(reqwest::Method::OPTIONS, gateway.url("/api/cart"))
            .header("origin", origin)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 403);
        assert!(res.headers().get("access-control-allow-origin").is_none());
        assert!(res.bytes().await.unwrap().is_empty());
    }
    assert_eq!(primary.hits(), 0);
}

#[tokio::test]
async fn test_allowed_origin_echoed_on_simple_request() {
    let primary = common::start_origin(200, "application/json", "{}").await;
    let failover = common::start_origin(200, "application/json", "{}").await;
    let gateway = common::start_gateway(common::gateway_config(&primary.url(), &failover.url())).await;

    let res = common::client()
        .get(gateway.url("/api/profile"))
        .header("origin", "https://app.example.com")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["access-control-allow-origin"], "https://app.example.com");
}

#[tokio::test]
async fn test_auth_tier_limit_rejects_extra_request() {
    let primary = common::start_origin(200, "application/json", r#"{"token":"t"}"#).await;
    let failover = common::start_origin(200, "application/json", "{}").await;
    let mut config = common::gateway_config(&primary.url(), &failover.url());
    config.rate_limit.enabled = true;
    config.rate_limit.auth.limit = TierLimit {
        max_requests: 3,
        window_secs: 3600,
    };
    config.geo.client_ip_header = Some("cf-connecting-ip".to_string());
    let gateway = common::start_gateway(config).await;
    let client = common::client();

    for _ in 0..3 {
        let res = client
            .post(gateway.url("/api/auth/login"))
            .header("cf-connecting-ip", "203.0.113.7")
            .body("{}")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }

    let res = client
        .post(gateway.url("/api/auth/login"))
        .header("cf-connecting-ip", "203.0.113.7")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 429);
    assert_eq!(res.headers()["retry-after"], "3600");
    assert_eq!(res.headers()["x-ratelimit-limit"], "3");
    assert_eq!(res.headers()["x-ratelimit-remaining"], "0");
    assert!(res.headers().contains_key("x-ratelimit-reset"));
    assert_eq!(res.headers()["x-frame-options"], "SAMEORIGIN");
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["tier"], "auth");
    assert_eq!(primary.hits(), 3);

    // Another client has its own window.
    let other = client
        .post(gateway.url("/api/auth/login"))
        .header("cf-connecting-ip", "198.51.100.2")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(other.status(), 200);

    // Other tiers are counted separately.
    let api = client
        .get(gateway.url("/api/products"))
        .header("cf-connecting-ip", "203.0.113.7")
        .send()
        .await
        .unwrap();
    assert_eq!(api.status(), 200);
}

#[tokio::test]
async fn test_spoofed_client_ip_header_shares_socket_window() {
    let primary = common::start_origin(200, "application/json", r#"{"token":"t"}"#).await;
    let failover = common::start_origin(200, "application/json", "{}").await;
    let mut config = common::gateway_config(&primary.url(), &failover.url());
    config.rate_limit.enabled = true;
    config.rate_limit.auth.limit = TierLimit {
        max_requests: 3,
        window_secs: 3600,
    };
    let gateway = common::start_gateway(config).await;
    let client = common::client();

    let mut admitted = 0;
    for i in 0..10 {
        let res = client
            .post(gateway.url("/api/auth/login"))
            .header("cf-connecting-ip", format!("203.0.113.{}", i))
            .body("{}")
            .send()
            .await
            .unwrap();
        if res.status() == 200 {
            admitted += 1;
        } else {
            assert_eq!(res.status(), 429);
        }
    }
    assert_eq!(admitted, 3);
    assert_eq!(primary.hits(), 3);
}

#[tokio::test]
async fn test_security_headers_on_origin_responses() {
    let primary = common::start_programmable_origin(|_| {
        let mut response = Response::new(Body::from("ok"));
        response
            .headers_mut()
            .insert("x-frame-options", "ALLOWALL".parse().unwrap());
        response
    })
    .await;
    let failover = common::start_origin(200, "text/plain", "origin").await;
    let gateway = common::start_gateway(common::gateway_config(&primary.url(), &failover.url())).await;

    let res = common::client().get(gateway.url("/")).send().await.unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-frame-options"], "SAMEORIGIN");
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    assert!(res.headers().contains_key("strict-transport-security"));
    assert!(res.headers().contains_key("referrer-policy"));
}

#[tokio::test]
async fn test_origin_sees_forwarding_context() {
    let primary = common::start_programmable_origin(|request| {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string()
        };
        let body = format!(
            "{}|{}|{}|{}",
            header("x-forwarded-for"),
            header("cf-ipcountry"),
            header("x-request-id"),
            header("x-forwarded-proto")
        );
        Response::new(Body::from(body))
    })
    .await;
    let failover = common::start_origin(200, "text/plain", "origin").await;
    let mut config = common::gateway_config(&primary.url(), &failover.url());
    config.geo.client_ip_header = Some("cf-connecting-ip".to_string());
    let gateway = common::start_gateway(config).await;

    let res = common::client()
        .get(gateway.url("/whoami"))
        .header("cf-connecting-ip", "203.0.113.9")
        .header("cf-ipcountry", "DE")
        .header("x-forwarded-proto", "http")
        .send()
        .await
        .unwrap();

    let request_id = res.headers()["x-request-id"].to_str().unwrap().to_string();
    let body = res.text().await.unwrap();
    let parts: Vec<&str> = body.split('|').collect();
    assert!(parts[0].contains("203.0.113.9"));
    assert_eq!(parts[1], "DE");
    assert_eq!(parts[2], request_id);
    // The configured public scheme wins over whatever the client claims.
    assert_eq!(parts[3], "https");
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let primary = common::start_origin(200, "text/plain", "origin").await;
    let failover = common::start_origin(200, "text/plain", "origin").await;
    let mut config = common::gateway_config(&primary.url(), &failover.url());
    config.listener.max_body_size = 16;
    let gateway = common::start_gateway(config).await;

    let res = common::client()
        .post(gateway.url("/upload"))
        .body(vec![b'x'; 64])
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 413);
    assert_eq!(primary.hits(), 0);
}

struct ExplodingStore;

#[async_trait]
impl ObjectStore for ExplodingStore {
    async fn get(&self, _key: &str) -> Result<Option<StoredObject>, StoreError> {
        panic!("object store driver crashed");
    }
}

#[tokio::test]
async fn test_panic_while_serving_returns_fallback_page() {
    let primary = common::start_origin(200, "text/plain", "origin").await;
    let failover = common::start_origin(200, "text/plain", "origin").await;
    let assets = StaticAssets::new("/static/", Arc::new(ExplodingStore));
    let gateway = common::start_gateway_with_assets(
        common::gateway_config(&primary.url(), &failover.url()),
        assets,
    )
    .await;
    let client = common::client();

    let res = client.get(gateway.url("/static/app.js")).send().await.unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!(res.headers()["retry-after"], "30");
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    assert!(res.text().await.unwrap().contains("temporarily unavailable"));
    assert_eq!(primary.hits(), 0);

    // The gateway keeps serving other paths after the panic.
    let res = client.get(gateway.url("/home")).send().await.unwrap();
    assert_eq!(res.status(), 200);
}
