//! Primary/failover origin fetcher.

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode, Uri};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::time;

use crate::config::OriginConfig;
use crate::http::request::{RequestDescriptor, X_REQUEST_ID};
use crate::observability::metrics;
use crate::security::headers::{set_forwarded_headers, strip_hop_by_hop};
use crate::upstream::{FetchError, OriginRole};

/// A fully received origin response.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub origin: OriginRole,
    pub latency: Duration,
}

impl OriginResponse {
    pub fn into_response(self, head_only: bool) -> Response<Body> {
        let body = if head_only {
            Body::empty()
        } else {
            Body::from(self.body)
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Forwards requests to the primary origin, then once to the failover origin.
#[derive(Clone)]
pub struct OriginFetcher {
    client: Client<HttpConnector, Full<Bytes>>,
    primary: String,
    failover: String,
    timeout: Duration,
    public_scheme: String,
}

impl OriginFetcher {
    pub fn new(config: &OriginConfig, public_scheme: impl Into<String>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_millis(config.connect_timeout_ms)));
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            primary: config.primary_url.trim_end_matches('/').to_string(),
            failover: config.failover_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_millis(config.timeout_ms),
            public_scheme: public_scheme.into(),
        }
    }

    pub fn base_url(&self, origin: OriginRole) -> &str {
        match origin {
            OriginRole::Primary => &self.primary,
            OriginRole::Failover => &self.failover,
        }
    }

    /// Forward `request`. Fails only when both origins are unavailable.
    pub async fn forward(&self, request: &RequestDescriptor) -> Result<OriginResponse, FetchError> {
        match self.attempt(OriginRole::Primary, request).await {
            Ok(response) if !response.status.is_server_error() => return Ok(response),
            Ok(response) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    status = %response.status,
                    "Primary origin returned server error, failing over"
                );
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    error = %e,
                    "Primary origin unavailable, failing over"
                );
            }
        }
        self.attempt(OriginRole::Failover, request).await
    }

    /// One bounded exchange with one origin. The timeout covers the body.
    async fn attempt(
        &self,
        origin: OriginRole,
        request: &RequestDescriptor,
    ) -> Result<OriginResponse, FetchError> {
        let start = Instant::now();
        let outgoing = self.build_request(origin, request)?;

        let exchange = async {
            let response = self
                .client
                .request(outgoing)
                .await
                .map_err(|source| FetchError::Transport { origin, source })?;
            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|source| FetchError::Body { origin, source })?
                .to_bytes();
            Ok::<_, FetchError>((parts, body))
        };

        let result = match time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                origin,
                timeout: self.timeout,
            }),
        };
        let latency = start.elapsed();

        match result {
            Ok((parts, body)) => {
                let outcome = if parts.status.is_server_error() { "server_error" } else { "ok" };
                metrics::record_origin_request(origin.as_str(), outcome);
                tracing::debug!(
                    request_id = %request.request_id,
                    origin = origin.as_str(),
                    status = %parts.status,
                    latency_ms = latency.as_millis() as u64,
                    "Origin responded"
                );
                let mut headers = parts.headers;
                strip_hop_by_hop(&mut headers);
                Ok(OriginResponse {
                    status: parts.status,
                    headers,
                    body,
                    origin,
                    latency,
                })
            }
            Err(e) => {
                let outcome = if matches!(e, FetchError::Timeout { .. }) { "timeout" } else { "error" };
                metrics::record_origin_request(origin.as_str(), outcome);
                tracing::debug!(
                    request_id = %request.request_id,
                    origin = origin.as_str(),
                    latency_ms = latency.as_millis() as u64,
                    error = %e,
                    "Origin attempt failed"
                );
                Err(e)
            }
        }
    }

    fn build_request(
        &self,
        origin: OriginRole,
        request: &RequestDescriptor,
    ) -> Result<Request<Full<Bytes>>, FetchError> {
        let target = format!("{}{}", self.base_url(origin), request.path_and_query());
        let uri: Uri = target.parse().map_err(|e: axum::http::uri::InvalidUri| {
            FetchError::InvalidTarget {
                origin,
                message: e.to_string(),
            }
        })?;

        let mut headers = request.headers.clone();
        strip_hop_by_hop(&mut headers);
        let original_host = headers
            .remove(header::HOST)
            .and_then(|v| v.to_str().ok().map(str::to_string));
        set_forwarded_headers(
            &mut headers,
            &request.client_ip,
            original_host.as_deref(),
            &self.public_scheme,
        );
        if let Ok(value) = HeaderValue::from_str(&request.request_id) {
            headers.insert(X_REQUEST_ID, value);
        }

        let mut outgoing = Request::builder()
            .method(request.method.clone())
            .uri(uri)
            .body(Full::new(request.body.clone()))
            .map_err(|e| FetchError::InvalidTarget {
                origin,
                message: e.to_string(),
            })?;
        *outgoing.headers_mut() = headers;
        Ok(outgoing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use axum::routing::get;
    use axum::Router;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use url::Url;

    async fn spawn_origin(app: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn dead_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    fn fetcher(primary: SocketAddr, failover: SocketAddr, timeout_ms: u64) -> OriginFetcher {
        OriginFetcher::new(
            &OriginConfig {
                primary_url: format!("http://{}", primary),
                failover_url: format!("http://{}", failover),
                timeout_ms,
                connect_timeout_ms: 500,
            },
            "https",
        )
    }

    fn descriptor(path: &str) -> RequestDescriptor {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("edge.example.com"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        RequestDescriptor {
            method: Method::GET,
            url: Url::parse(&format!("https://edge.example.com{}", path)).unwrap(),
            headers,
            body: Bytes::new(),
            client_ip: "203.0.113.5".into(),
            country: "DE".into(),
            request_id: "req-42".into(),
        }
    }

    #[tokio::test]
    async fn test_primary_success_is_used() {
        let primary = spawn_origin(Router::new().route("/", get(|| async { "primary" }))).await;
        let failover = spawn_origin(Router::new().route("/", get(|| async { "failover" }))).await;

        let response = fetcher(primary, failover, 1000).forward(&descriptor("/")).await.unwrap();
        assert_eq!(response.origin, OriginRole::Primary);
        assert_eq!(&response.body[..], b"primary");
    }

    #[tokio::test]
    async fn test_server_error_fails_over() {
        let primary = spawn_origin(Router::new().route(
            "/",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "broken") }),
        ))
        .await;
        let failover = spawn_origin(Router::new().route("/", get(|| async { "failover" }))).await;

        let response = fetcher(primary, failover, 1000).forward(&descriptor("/")).await.unwrap();
        assert_eq!(response.origin, OriginRole::Failover);
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"failover");
    }

    #[tokio::test]
    async fn test_client_error_is_authoritative() {
        let primary = spawn_origin(Router::new()).await;
        let failover = spawn_origin(Router::new().route("/gone", get(|| async { "failover" }))).await;

        let response = fetcher(primary, failover, 1000).forward(&descriptor("/gone")).await.unwrap();
        assert_eq!(response.origin, OriginRole::Primary);
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unreachable_primary_fails_over() {
        let failover = spawn_origin(Router::new().route("/", get(|| async { "failover" }))).await;
        let response = fetcher(dead_addr().await, failover, 1000)
            .forward(&descriptor("/"))
            .await
            .unwrap();
        assert_eq!(response.origin, OriginRole::Failover);
    }

    #[tokio::test]
    async fn test_both_down_is_an_error() {
        let result = fetcher(dead_addr().await, dead_addr().await, 500)
            .forward(&descriptor("/"))
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.origin(), OriginRole::Failover);
    }

    #[tokio::test]
    async fn test_hung_origin_times_out() {
        let slow = Router::new().route(
            "/",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let primary = spawn_origin(slow.clone()).await;
        let failover = spawn_origin(slow).await;

        let start = Instant::now();
        let err = fetcher(primary, failover, 100)
            .forward(&descriptor("/"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { origin: OriginRole::Failover, .. }));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_forwarded_headers() {
        let echo = Router::new().route(
            "/echo",
            get(|headers: HeaderMap| async move {
                let value = |name: &str| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-")
                        .to_string()
                };
                format!(
                    "{}|{}|{}|{}",
                    value("x-forwarded-for"),
                    value("x-forwarded-host"),
                    value("x-forwarded-proto"),
                    value("x-request-id")
                )
            }),
        );
        let primary = spawn_origin(echo).await;
        let response = fetcher(primary, dead_addr().await, 1000)
            .forward(&descriptor("/echo"))
            .await
            .unwrap();
        assert_eq!(
            std::str::from_utf8(&response.body).unwrap(),
            "203.0.113.5|edge.example.com|https|req-42"
        );
    }
}
