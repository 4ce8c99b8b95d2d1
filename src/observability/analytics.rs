//! Per-request analytics events.
//!
//! # Responsibilities
//! - Describe the outcome of each request as one event
//! - Hand events to an external sink without ever blocking a request
//!
//! # Design Decisions
//! - `emit` is synchronous: try-send into a bounded queue, drop when full
//! - A single worker drains the queue into the sink
//! - Sink failures are logged and discarded

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::config::{AnalyticsConfig, AnalyticsSinkKind};
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CacheHit,
    OriginSuccess,
    OriginError,
    RateLimited,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CacheHit => "cache_hit",
            EventKind::OriginSuccess => "origin_success",
            EventKind::OriginError => "origin_error",
            EventKind::RateLimited => "rate_limited",
            EventKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub event_kind: EventKind,
    pub path: String,
    pub country_code: String,
    pub user_agent: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub request_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl AnalyticsEvent {
    pub fn now(
        event_kind: EventKind,
        path: impl Into<String>,
        country_code: impl Into<String>,
        user_agent: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            event_kind,
            path: path.into(),
            country_code: country_code.into(),
            user_agent: user_agent.into(),
            duration_ms: duration.as_millis() as u64,
            status: None,
            request_id: String::new(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("delivery failed: {0}")]
    Delivery(#[from] reqwest::Error),

    #[error("sink rejected event with status {0}")]
    Rejected(u16),
}

/// Destination for analytics events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &AnalyticsEvent) -> Result<(), SinkError>;
}

/// Writes each event as a structured log line.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn deliver(&self, event: &AnalyticsEvent) -> Result<(), SinkError> {
        tracing::info!(
            target: "edge_gateway::analytics",
            kind = event.event_kind.as_str(),
            path = %event.path,
            country = %event.country_code,
            user_agent = %event.user_agent,
            duration_ms = event.duration_ms,
            status = ?event.status,
            request_id = %event.request_id,
            "request event"
        );
        Ok(())
    }
}

/// POSTs each event as JSON to an ingestion endpoint.
#[derive(Debug)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl EventSink for HttpSink {
    async fn deliver(&self, event: &AnalyticsEvent) -> Result<(), SinkError> {
        let response = self.client.post(&self.endpoint).json(event).send().await?;
        if !response.status().is_success() {
            return Err(SinkError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Cheap, cloneable handle used by request handlers.
#[derive(Debug, Clone)]
pub struct AnalyticsEmitter {
    tx: Option<mpsc::Sender<AnalyticsEvent>>,
}

impl AnalyticsEmitter {
    /// An emitter that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Create an emitter and the worker that feeds `sink`.
    pub fn new(sink: Arc<dyn EventSink>, capacity: usize) -> (Self, AnalyticsWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, AnalyticsWorker { rx, sink })
    }

    /// Build the emitter described by the analytics config.
    pub fn from_config(config: &AnalyticsConfig) -> Result<(Self, Option<AnalyticsWorker>), SinkError> {
        if !config.enabled {
            return Ok((Self::disabled(), None));
        }
        let sink: Arc<dyn EventSink> = match (config.sink, config.endpoint.as_deref()) {
            (AnalyticsSinkKind::Http, Some(endpoint)) => Arc::new(HttpSink::new(
                endpoint,
                Duration::from_millis(config.timeout_ms),
            )?),
            _ => Arc::new(LogSink),
        };
        let (emitter, worker) = Self::new(sink, config.queue_capacity);
        Ok((emitter, Some(worker)))
    }

    /// Queue an event. Never blocks and never fails the caller.
    pub fn emit(&self, event: AnalyticsEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(event) {
            metrics::record_analytics_dropped();
            tracing::debug!(error = %e, "Analytics event dropped");
        }
    }
}

/// Drains queued events into the sink.
pub struct AnalyticsWorker {
    rx: mpsc::Receiver<AnalyticsEvent>,
    sink: Arc<dyn EventSink>,
}

impl AnalyticsWorker {
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                event = self.rx.recv() => match event {
                    Some(event) => self.deliver(event).await,
                    None => break,
                },
                _ = shutdown.recv() => {
                    self.rx.close();
                    while let Some(event) = self.rx.recv().await {
                        self.deliver(event).await;
                    }
                    break;
                }
            }
        }
        tracing::debug!("Analytics worker stopped");
    }

    async fn deliver(&self, event: AnalyticsEvent) {
        if let Err(e) = self.sink.deliver(&event).await {
            metrics::record_background_failure("analytics");
            tracing::warn!(error = %e, kind = event.event_kind.as_str(), "Analytics delivery failed");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Collects events in memory.
    #[derive(Default)]
    pub struct MemorySink {
        pub events: Mutex<Vec<AnalyticsEvent>>,
    }

    #[async_trait]
    impl EventSink for MemorySink {
        async fn deliver(&self, event: &AnalyticsEvent) -> Result<(), SinkError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl EventSink for FailingSink {
        async fn deliver(&self, _event: &AnalyticsEvent) -> Result<(), SinkError> {
            Err(SinkError::Rejected(500))
        }
    }

    fn event(kind: EventKind) -> AnalyticsEvent {
        AnalyticsEvent::now(kind, "/", "DE", "test", Duration::from_millis(3))
    }

    #[tokio::test]
    async fn test_events_reach_sink() {
        let sink = Arc::new(MemorySink::default());
        let (emitter, worker) = AnalyticsEmitter::new(sink.clone(), 8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(worker.run(shutdown_rx));

        emitter.emit(event(EventKind::CacheHit));
        emitter.emit(event(EventKind::OriginError).with_status(502));
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].status, Some(502));
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let sink = Arc::new(MemorySink::default());
        let (emitter, _worker) = AnalyticsEmitter::new(sink, 1);
        emitter.emit(event(EventKind::CacheHit));
        emitter.emit(event(EventKind::CacheHit));
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let (emitter, worker) = AnalyticsEmitter::new(Arc::new(FailingSink), 4);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(worker.run(shutdown_rx));
        emitter.emit(event(EventKind::Error));
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(event(EventKind::RateLimited).with_request_id("abc")).unwrap();
        assert_eq!(json["eventKind"], "rate_limited");
        assert_eq!(json["countryCode"], "DE");
        assert_eq!(json["durationMs"], 3);
        assert_eq!(json["requestId"], "abc");
        assert!(json.get("status").is_none());
    }

    #[test]
    fn test_disabled_emitter_is_noop() {
        AnalyticsEmitter::disabled().emit(event(EventKind::CacheHit));
    }
}
