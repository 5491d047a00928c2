//! Prometheus exporter for Junos devices.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use junosight_common::init_tracing;
use junosight_exporter::{ExporterConfig, HttpServer, build_scraper};
use junosight_ssh::{ConnectionPool, SshDialer};

/// Prometheus exporter for Junos devices.
#[derive(Parser, Debug)]
#[command(name = "junosight")]
#[command(about = "Scrape Junos devices over SSH and export Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error). Overrides config.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    // Override from CLI
    if let Some(listen) = args.listen {
        config.prometheus.listen = listen;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging)?;

    info!("Starting junosight exporter");

    if config.devices.is_empty() {
        warn!("No devices configured; scrapes will only be empty");
    }

    // Parse listen address
    let listen_addr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create components
    let pool = Arc::new(ConnectionPool::new(
        SshDialer::new(config.connect_timeout()),
        config.pool_config(),
    ));
    let (scraper, registry) = build_scraper(&config, pool.clone())?;
    let http_server = HttpServer::new(
        Arc::new(scraper),
        listen_addr,
        config.prometheus.path.clone(),
    );

    // Start HTTP server
    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(http_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    // Signal shutdown
    shutdown_tx.send(true)?;

    // Wait for the server to drain
    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    if let Some(registry) = &registry {
        info!(labels = ?registry.label_names(), "Dynamic interface labels");
    }

    info!(connections = pool.len(), "Closing device connections");
    pool.shutdown_all().await;

    info!("Exporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "Cannot install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
