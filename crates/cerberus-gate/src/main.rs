//! Cerberus Gate - proof-of-work bot mitigation in front of an origin.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cerberus_core::Registry;
use cerberus_gate::{routes, AppState, Settings};

/// Cerberus Gate - proof-of-work challenge layer
#[derive(Parser, Debug)]
#[command(name = "cerberus-gate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/cerberus.toml")]
    config: String,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting Cerberus Gate v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load(&args.config, args.listen.as_deref())?;
    info!("Configuration loaded from {}", args.config);

    let registry = Registry::new();
    let instance = registry
        .get_or_provision(&settings.instance_id, settings.cerberus.clone())
        .context("Failed to provision cerberus instance")?;

    let listen_addr = settings.listen_addr.clone();
    let state = AppState::new(settings, instance);
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!("Cerberus Gate listening on {}", listen_addr);

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
    .context("Server error")?;

    registry.close_all();
    info!("Cerberus Gate shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }

    Ok(())
}
