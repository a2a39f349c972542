//! pairchat relay server
//!
//! Accepts TCP connections, registers screen names, pairs clients and
//! relays their lines until one side disconnects.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default address (0.0.0.0:8999)
//! pairchatd
//!
//! # Custom address and limits
//! pairchatd --listen 127.0.0.1:9000 --max-clients 64 --idle-timeout 600
//!
//! # From a config file
//! pairchatd --config /etc/pairchat.toml
//! ```

use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use pairchatd::config::{Config, ServerArgs};
use pairchatd::registry::spawn_registry_with_capacity;
use pairchatd::server::{ChatServer, SessionSettings};

/// Crates whose level follows `--log-level`
const LOG_TARGETS: [&str; 3] = ["pairchatd", "pairchat_core", "pairchat_protocol"];

/// pairchat relay server
#[derive(Parser, Debug)]
#[command(name = "pairchatd", version, about)]
struct Args {
    #[command(flatten)]
    server: ServerArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.server).context("Failed to load configuration")?;
    run_server(config)
}

fn init_tracing(level: &str) -> Result<()> {
    let mut filter = EnvFilter::from_default_env();
    for target in LOG_TARGETS {
        let directive = format!("{target}={level}")
            .parse::<Directive>()
            .with_context(|| format!("Invalid log level '{level}'"))?;
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

#[tokio::main]
async fn run_server(config: Config) -> Result<()> {
    init_tracing(&config.log_level)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "pairchat relay starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry_with_capacity(config.max_clients);
    info!(max_clients = config.max_clients, "Name registry started");

    let server = ChatServer::bind(
        &config.listen,
        registry,
        SessionSettings::from(&config),
        cancel_token,
    )
    .await
    .context("Failed to start server")?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("pairchat relay stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
