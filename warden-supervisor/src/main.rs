use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use warden_common::SupervisorConfig;
use warden_supervisor::server::SupervisorServer;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/warden/supervisor.toml")]
    config: PathBuf,

    /// Bind address override
    #[arg(long)]
    bind: Option<IpAddr>,

    /// HTTP port override
    #[arg(long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!(
        "Starting Warden supervisor v{}",
        warden_common::WARDEN_VERSION
    );

    let mut config = SupervisorConfig::load(&args.config)?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(port) = args.port {
        config.http_port = port;
    }
    config.validate().context("invalid configuration")?;

    info!("Configuration loaded from: {:?}", args.config);
    info!(
        "Monitoring {} services every {}s (auto-repair: {})",
        config.services.len(),
        config.probe_interval_secs,
        config.auto_repair
    );
    if config.services.is_empty() {
        warn!("no services configured; the supervisor will idle");
    }

    let server = SupervisorServer::new(config)?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = signal_tx.send(());
        }
    });

    server.run(shutdown_tx).await
}
