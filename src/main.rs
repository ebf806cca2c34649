//! Endpoint gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ http server ─▶ routing ─▶ endpoint client ─▶ node ─────▶ Backend
//!                                                   │   ▲
//!                                        select / done   retry on error or
//!                                                   ▼   │   matching response
//!                                              load_balancer ◀── node_set ◀── discovery
//! ```

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;

use endpoint_gateway::config::loader::load_config;
use endpoint_gateway::discovery::{Discovery, FileRegistry};
use endpoint_gateway::lifecycle::{wait_for_signal, Shutdown};
use endpoint_gateway::observability::{logging, metrics};
use endpoint_gateway::{ClientFactory, GatewayServer};

#[derive(Parser)]
#[command(name = "endpoint-gateway")]
#[command(about = "Retrying, load-balanced API gateway", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init_tracing(&config.observability.log_level);
    tracing::info!(
        config = %cli.config.display(),
        endpoints = config.endpoints.len(),
        bind_address = %config.listener.bind_address,
        "endpoint-gateway starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry: Option<Arc<dyn Discovery>> = match &config.discovery.registry_file {
        Some(path) => Some(Arc::new(FileRegistry::open(Path::new(path))?)),
        None => None,
    };

    let server = GatewayServer::build(&config, &ClientFactory::new(registry)).await?;
    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, signal).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
