//! CRM server binary.
//!
//! Loads the TOML config, opens the store, then serves the API until SIGINT
//! or SIGTERM. Shutdown drains open requests and writes a final snapshot.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crm_server::config::{load_config, shared, ConfigWatcher, CrmConfig};
use crm_server::lifecycle::{build_crm, signals::shutdown_on_signal, Maintenance};
use crm_server::net::load_tls_config;
use crm_server::observability::{logging::init_logging, metrics::init_metrics};
use crm_server::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "crm-server", version, about = "Multi-tenant CRM server")]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long, env = "CRM_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => CrmConfig::default(),
    };
    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "crm-server starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener_config = config.listener.clone();
    let shared_config = shared(config);
    let crm = build_crm(shared_config)?;

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));
    let maintenance = tokio::spawn(Maintenance::new(crm.clone()).run(shutdown.subscribe()));

    // The watcher stops when dropped, so it lives until main returns.
    let (updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (updates, Some(handle)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload disabled");
                    (updates, None)
                }
            }
        }
        None => (mpsc::unbounded_channel().1, None),
    };

    let server = HttpServer::new(crm, shutdown.clone());
    match &listener_config.tls {
        Some(tls) => {
            let addr: SocketAddr = listener_config.bind_address.parse()?;
            let rustls = load_tls_config(tls).await?;
            server.run_tls(addr, rustls, updates).await?;
        }
        None => {
            let listener = TcpListener::bind(&listener_config.bind_address).await?;
            server.run(listener, updates).await?;
        }
    }

    // Listener exits on its own only on error paths; make sure the sweep stops.
    shutdown.trigger();
    if let Err(e) = maintenance.await {
        tracing::error!(error = %e, "Maintenance task failed");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
