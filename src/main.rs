//! Edge request gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────────┐
//!                     │                      EDGE GATEWAY                         │
//!                     │                                                           │
//!   Client Request    │  ┌──────┐   ┌────────────┐   ┌────────┐   ┌───────────┐  │
//!   ──────────────────┼─▶│ CORS │──▶│ rate limit │──▶│ static │──▶│   cache   │  │
//!                     │  └──────┘   └─────┬──────┘   └───┬────┘   └─────┬─────┘  │
//!                     │                   │ KvStore      │ ObjectStore  │ miss   │
//!                     │                   ▼              ▼              ▼        │
//!                     │              counters        assets     ┌────────────┐   │  primary
//!                     │                                         │  failover  │───┼──▶ origin
//!   Client Response   │  ┌──────────────────┐                   │  fetcher   │───┼──▶ failover
//!   ◀─────────────────┼──│ security headers │◀──────────────────┴────────────┘   │
//!                     │  └──────────────────┘       │ background: cache store,   │
//!                     │                             │ revalidation, analytics    │
//!                     │  ┌──────────────────────────────────────────────────────┐│
//!                     │  │ health monitor (timer) · admin API · actors · metrics ││
//!                     │  └──────────────────────────────────────────────────────┘│
//!                     └──────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use edge_gateway::config::{self, GatewayConfig};
use edge_gateway::lifecycle::signals::shutdown_signal;
use edge_gateway::observability::{logging, metrics};
use edge_gateway::{GatewayServer, Shutdown};

#[derive(Parser)]
#[command(name = "edge-gateway", version, about = "Edge request gateway")]
struct Args {
    /// Path to a TOML config file. Without it, defaults plus environment overrides apply.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config: GatewayConfig = match &args.config {
        Some(path) => config::load_config(path)?,
        None => config::load_from_env()?,
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        origin_timeout_ms = config.origins.timeout_ms,
        cache_enabled = config.cache.enabled,
        rate_limit_enabled = config.rate_limit.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let admin_listener = if config.admin.enabled {
        Some(TcpListener::bind(&config.admin.bind_address).await?)
    } else {
        None
    };

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.trigger();
    });

    let server = GatewayServer::new(config)?;
    server.run(listener, admin_listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
