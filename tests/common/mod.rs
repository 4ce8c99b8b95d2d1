//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use tokio::net::TcpListener;

use edge_gateway::assets::StaticAssets;
use edge_gateway::config::GatewayConfig;
use edge_gateway::{GatewayServer, Shutdown};

/// A mock origin returning a fixed response and counting requests.
pub struct MockOrigin {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl MockOrigin {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Start a mock origin answering every request with `status`, `content_type` and `body`.
pub async fn start_origin(status: u16, content_type: &'static str, body: &'static str) -> MockOrigin {
    start_programmable_origin(move |_| {
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = StatusCode::from_u16(status).unwrap();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type.parse().unwrap());
        response
    })
    .await
}

/// Start a mock origin whose responses are computed per request.
pub async fn start_programmable_origin<F>(f: F) -> MockOrigin
where
    F: Fn(&Request<Body>) -> Response<Body> + Clone + Send + Sync + 'static,
{
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().fallback(move |request: Request<Body>| {
        let f = f.clone();
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            f(&request)
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    MockOrigin { addr, hits }
}

/// Start a mock origin that waits `delay` before answering.
pub async fn start_slow_origin(delay: Duration) -> MockOrigin {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().fallback(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            "too late"
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    MockOrigin { addr, hits }
}

/// An address nothing listens on.
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Baseline config for tests: no health checks, no analytics, no metrics exporter, no rate limits.
pub fn gateway_config(primary: &str, failover: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.origins.primary_url = primary.to_string();
    config.origins.failover_url = failover.to_string();
    config.origins.timeout_ms = 2_000;
    config.origins.connect_timeout_ms = 500;
    config.health_check.enabled = false;
    config.analytics.enabled = false;
    config.observability.metrics_enabled = false;
    config.rate_limit.enabled = false;
    config.cors.allowed_origins = vec!["https://app.example.com".to_string()];
    config.cors.parent_domain = Some("example.com".to_string());
    config
}

/// A gateway running on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    serve(GatewayServer::new(config).unwrap()).await
}

pub async fn start_gateway_with_assets(config: GatewayConfig, assets: StaticAssets) -> TestGateway {
    serve(GatewayServer::with_static_assets(config, assets).unwrap()).await
}

async fn serve(server: GatewayServer) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, None, server_shutdown).await;
    });
    TestGateway { addr, shutdown }
}

/// Client without connection pooling or system proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
