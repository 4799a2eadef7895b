//! pxe-proxyd - proxyDHCP daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pxe_proxy::config::Config;
use pxe_proxy::handler::MessageHandler;
use pxe_proxy::leases::LeasePoller;
use pxe_proxy::proxydhcp::ProxyDhcpServer;
use pxe_proxy::services::FileRegistry;

#[derive(Parser)]
#[command(name = "pxe-proxyd")]
#[command(about = "ProxyDHCP responder - tells PXE clients which boot file to load")]
struct Args {
    /// Config file (defaults to $PXE_PROXY_CONFIG or /etc/pxe-proxy.conf)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not tail the ISC dhcpd leases file
    #[arg(long)]
    no_lease_poller: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.tracing_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Starting pxe-proxyd");
    info!("Data directory: {:?}", config.data_dir);

    let registry = Arc::new(FileRegistry::new(config.data_dir.clone()));
    registry
        .ensure_data_dir()
        .context("Failed to create data directory")?;

    let handler = Arc::new(MessageHandler::new(
        &config,
        registry.clone(),
        registry.clone(),
        registry.clone(),
    ));
    let server = ProxyDhcpServer::bind(&config, handler)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller = if args.no_lease_poller {
        info!("Lease poller disabled");
        None
    } else {
        let poller = LeasePoller::new(
            config.leases_file.clone(),
            config.lease_poll_interval,
            registry.clone(),
        )?;
        Some(tokio::spawn(poller.run(shutdown_rx.clone())))
    };

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    let mut server = tokio::spawn(server.run(shutdown_rx));

    let served = tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
            None
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
            None
        }
        result = &mut server => Some(result),
    };

    // Ignore send errors: every receiver may already be gone.
    let _ = shutdown_tx.send(true);

    let served = match served {
        Some(result) => result,
        None => server.await,
    };

    if let Some(poller) = poller {
        if let Err(e) = poller.await.context("Lease poller task failed")? {
            error!(error = %e, "Lease poller failed");
        }
    }

    served
        .context("ProxyDHCP server task failed")?
        .context("ProxyDHCP server failed")?;

    info!("Server stopped");
    Ok(())
}
