//! Edge gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                     EDGE GATEWAY                      │
//!                      │                                                       │
//!   Client Request     │  ┌─────────┐   ┌─────────┐   ┌─────────┐              │
//!   ───────────────────┼─▶│  http   │──▶│ routing │──▶│  cache  │── hit ──┐    │
//!                      │  │ server  │   │ prefix  │   │  (TTL)  │         │    │
//!                      │  └─────────┘   └─────────┘   └────┬────┘         │    │
//!                      │                                   │ miss         │    │
//!                      │                                   ▼              │    │
//!                      │                ┌──────────┐  ┌──────────┐        │    │
//!                      │                │ registry │─▶│ breaker  │────────┼────┼──▶ Backend
//!                      │                │ name→url │  │ + reroute│        │    │
//!                      │                └──────────┘  └──────────┘        │    │
//!   Client Response    │                                                  │    │
//!   ◀──────────────────┼──────────────────────────────────────────────────┘    │
//!                      │                                                       │
//!                      │  config · observability · security · lifecycle        │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use edge_gateway::config::{loader::config_from_env, load_config, watcher::ConfigWatcher};
use edge_gateway::lifecycle::{signals::shutdown_on_signal, Shutdown};
use edge_gateway::observability::{logging::init_logging, metrics::init_metrics};
use edge_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "edge-gateway", version, about = "Edge gateway with circuit breakers and response caching")]
struct Args {
    /// TOML configuration file; built-in defaults plus environment overrides when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => config_from_env()?,
    };
    init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        request_timeout_secs = config.timeouts.request_secs,
        call_timeout_ms = config.breaker.call_timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher must outlive the server; dropping it stops notifications.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, &config);
            (Some(watcher.run()?), updates)
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(shutdown_on_signal(shutdown));

    HttpServer::new(config)
        .run(listener, config_updates, server_shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
