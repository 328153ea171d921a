use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use api_gateway::config::loader::parse_config;
use api_gateway::config::{load_config, ConfigWatcher};
use api_gateway::lifecycle::{shutdown_on_signal, Shutdown};
use api_gateway::observability::{init_logging, metrics};
use api_gateway::{Gateway, GatewayServer};

/// API gateway: routes, authenticates, rate limits and isolates failing
/// backend services.
#[derive(Debug, Parser)]
#[command(name = "api-gateway", version, about)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Reload the service list when the configuration file changes.
    #[arg(long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => parse_config("", |key| std::env::var(key).ok())?,
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-gateway starting");

    if config.observability.metrics_enabled {
        metrics::init_metrics();
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    let gateway = Arc::new(Gateway::from_config(config, shutdown.clone())?);
    let background = gateway.spawn_background();

    // Keep the watcher alive for the whole run.
    let _watcher = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            let watcher = watcher.run()?;
            tokio::spawn(gateway.clone().follow_config(updates));
            Some(watcher)
        }
        _ => None,
    };

    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    GatewayServer::new(gateway.clone()).run(listener).await?;

    gateway.stop();
    for handle in background {
        let _ = handle.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
