//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the shared gateway state from configuration
//! - Create the public Axum router (every path goes through the gateway)
//! - Wire up middleware (request ID, tracing)
//! - Spawn the health monitor, analytics worker and store janitor
//! - Serve until shutdown, then drain background work

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::actor::{CounterRegistry, SessionRegistry};
use crate::admin::{self, AdminState};
use crate::assets::StaticAssets;
use crate::cache::CacheManager;
use crate::config::GatewayConfig;
use crate::health::{HealthBoard, HealthMonitor};
use crate::http::gateway::Gateway;
use crate::lifecycle::{BackgroundTasks, Shutdown};
use crate::observability::{AnalyticsEmitter, AnalyticsWorker, SinkError};
use crate::store::MemoryKvStore;

const JANITOR_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to build analytics sink: {0}")]
    Analytics(#[from] SinkError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The edge gateway server: public listener plus optional admin listener.
pub struct GatewayServer {
    config: Arc<GatewayConfig>,
    gateway: Arc<Gateway>,
    counters: MemoryKvStore,
    health: HealthBoard,
    admin: AdminState,
    background: BackgroundTasks,
    analytics_worker: Option<AnalyticsWorker>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        Self::build(config, None)
    }

    /// Serve static assets from `assets` instead of the configured root.
    pub fn with_static_assets(config: GatewayConfig, assets: StaticAssets) -> Result<Self, ServerError> {
        Self::build(config, Some(assets))
    }

    fn build(config: GatewayConfig, assets: Option<StaticAssets>) -> Result<Self, ServerError> {
        let config = Arc::new(config);
        let counters = MemoryKvStore::new(config.cache.max_entries.max(1024) * 4);
        let cache = Arc::new(CacheManager::new(&config.cache));
        let background = BackgroundTasks::new();
        let (analytics, analytics_worker) = AnalyticsEmitter::from_config(&config.analytics)?;

        let mut gateway = Gateway::new(
            config.clone(),
            Arc::new(counters.clone()),
            cache.clone(),
            analytics,
            background.clone(),
        );
        if let Some(assets) = assets {
            gateway = gateway.with_assets(assets);
        }

        let health = HealthBoard::new();
        let admin = AdminState {
            api_key: Arc::from(config.admin.api_key.as_str()),
            cache,
            health: health.clone(),
            counters: Arc::new(CounterRegistry::new()),
            sessions: Arc::new(SessionRegistry::new()),
            started_at: std::time::Instant::now(),
        };

        Ok(Self {
            config,
            gateway: Arc::new(gateway),
            counters,
            health,
            admin,
            background,
            analytics_worker,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    /// Public router. Every method and path is handled by the gateway.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(gateway_handler)
            .with_state(self.gateway.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TraceLayer::new_for_http()),
            )
    }

    pub fn admin_router(&self) -> Router {
        admin::router(self.admin.clone())
    }

    /// Serve until `shutdown` fires, then drain deferred work.
    pub async fn run(
        mut self,
        listener: TcpListener,
        admin_listener: Option<TcpListener>,
        shutdown: Shutdown,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            primary = %self.config.origins.primary_url,
            failover = %self.config.origins.failover_url,
            "Edge gateway starting"
        );

        let mut loops: Vec<JoinHandle<()>> = Vec::new();

        let monitor = HealthMonitor::new(
            &self.config.origins,
            self.config.health_check.clone(),
            self.health.clone(),
        );
        loops.push(tokio::spawn(monitor.run(shutdown.subscribe())));

        if let Some(worker) = self.analytics_worker.take() {
            loops.push(tokio::spawn(worker.run(shutdown.subscribe())));
        }

        loops.push(tokio::spawn(
            self.counters
                .clone()
                .run_janitor(JANITOR_INTERVAL, shutdown.subscribe()),
        ));

        if let Some(admin_listener) = admin_listener {
            let admin_addr = admin_listener.local_addr()?;
            let app = self.admin_router();
            let mut stop = shutdown.subscribe();
            tracing::info!(address = %admin_addr, "Admin API listening");
            loops.push(tokio::spawn(async move {
                let served = axum::serve(admin_listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = stop.recv().await;
                    })
                    .await;
                if let Err(e) = served {
                    tracing::error!(error = %e, "Admin server failed");
                }
            }));
        }

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let mut stop = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await?;

        tracing::info!("Listener closed, draining background work");
        let drain = Duration::from_secs(self.config.shutdown.drain_timeout_secs);
        if !self.background.drain(drain).await {
            tracing::warn!(
                pending = self.background.pending(),
                "Background work abandoned at shutdown deadline"
            );
        }
        for handle in loops {
            if tokio::time::timeout(drain, handle).await.is_err() {
                tracing::warn!("Background loop did not stop before the deadline");
            }
        }

        tracing::info!("Edge gateway stopped");
        Ok(())
    }
}

async fn gateway_handler(
    State(gateway): State<Arc<Gateway>>,
    request: Request<Body>,
) -> Response<Body> {
    gateway.handle(request).await
}
