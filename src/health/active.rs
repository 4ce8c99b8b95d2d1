//! Active origin probing.
//!
//! # Responsibilities
//! - Periodically GET the health path on both origins
//! - Log the result and export it as a gauge
//! - Keep the last result per origin for the admin surface

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::http::{header, Request, Uri};
use bytes::Bytes;
use dashmap::DashMap;
use http_body_util::Empty;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::{HealthCheckConfig, OriginConfig};
use crate::observability::metrics;
use crate::upstream::OriginRole;

const USER_AGENT: &str = "edge-gateway-health-check";

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub origin: OriginRole,
    pub url: String,
    pub up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
    /// Unix milliseconds.
    pub checked_at: u64,
}

/// Last check result per origin. Read-only for everyone but the monitor.
#[derive(Debug, Clone, Default)]
pub struct HealthBoard {
    results: Arc<DashMap<OriginRole, CheckResult>>,
}

impl HealthBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, origin: OriginRole) -> Option<CheckResult> {
        self.results.get(&origin).map(|r| r.value().clone())
    }

    /// Results in primary, failover order.
    pub fn snapshot(&self) -> Vec<CheckResult> {
        [OriginRole::Primary, OriginRole::Failover]
            .into_iter()
            .filter_map(|origin| self.get(origin))
            .collect()
    }

    fn record(&self, result: CheckResult) {
        self.results.insert(result.origin, result);
    }
}

pub struct HealthMonitor {
    targets: [(OriginRole, String); 2],
    config: HealthCheckConfig,
    client: Client<HttpConnector, Empty<Bytes>>,
    board: HealthBoard,
}

impl HealthMonitor {
    pub fn new(origins: &OriginConfig, config: HealthCheckConfig, board: HealthBoard) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let target = |base: &str| format!("{}{}", base.trim_end_matches('/'), config.path);
        Self {
            targets: [
                (OriginRole::Primary, target(&origins.primary_url)),
                (OriginRole::Failover, target(&origins.failover_url)),
            ],
            config,
            client,
            board,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Origin health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Check both origins once.
    pub async fn check_all(&self) {
        let (primary, failover) = tokio::join!(
            self.check_origin(self.targets[0].0, &self.targets[0].1),
            self.check_origin(self.targets[1].0, &self.targets[1].1),
        );
        for result in [primary, failover] {
            metrics::record_origin_health(result.origin.as_str(), result.up);
            self.board.record(result);
        }
    }

    async fn check_origin(&self, origin: OriginRole, url: &str) -> CheckResult {
        let start = Instant::now();
        let (status, error) = match self.send(url).await {
            Ok(status) => (Some(status), None),
            Err(e) => (None, Some(e)),
        };
        let up = status.is_some_and(|s| (200..300).contains(&s));

        match (&status, &error) {
            (Some(status), _) if up => {
                tracing::debug!(origin = origin.as_str(), status, "Origin healthy")
            }
            (Some(status), _) => {
                tracing::warn!(origin = origin.as_str(), url, status, "Health check failed: non-success status")
            }
            (None, Some(e)) => {
                tracing::warn!(origin = origin.as_str(), url, error = %e, "Health check failed")
            }
            (None, None) => {}
        }

        CheckResult {
            origin,
            url: url.to_string(),
            up,
            status,
            error,
            latency_ms: start.elapsed().as_millis() as u64,
            checked_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }

    async fn send(&self, url: &str) -> Result<u16, String> {
        let uri: Uri = url.parse().map_err(|e| format!("invalid url: {}", e))?;
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::USER_AGENT, USER_AGENT)
            .body(Empty::new())
            .map_err(|e| format!("failed to build request: {}", e))?;

        let timeout = Duration::from_secs(self.config.timeout_secs);
        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(response.status().as_u16()),
            Ok(Err(e)) => Err(format!("connection error: {}", e)),
            Err(_) => Err(format!("timeout after {:?}", timeout)),
        }
    }
}
