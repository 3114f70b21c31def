//! Main Entrypoint for the Robot Speech Bridge
//!
//! Loads configuration, applies any command-line overrides, checks that the
//! device process is available and serves the bridge until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use colloquy_bridge::{
    config::{Config, parse_volume},
    router::create_router,
    state::AppState,
};
use std::{net::SocketAddr, path::Path, sync::Arc};
use tracing::{info, warn};

/// Relays text to the robot through the device-control process.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Robot IP address, overrides ROBOT_ADDRESS.
    robot_address: Option<String>,
    /// Language name passed to the device, overrides ROBOT_LANGUAGE.
    language: Option<String>,
    /// Speech volume 0-100, overrides ROBOT_VOLUME.
    volume: Option<String>,
}

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(address) = cli.robot_address {
        config.robot_address = address;
    }
    if let Some(language) = cli.language {
        config.language = language;
    }
    if let Some(volume) = cli.volume {
        config.volume = parse_volume(&volume).context("Invalid volume argument")?;
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    // --- 3. Check the device process ---
    let program = &config.device_command.program;
    if program.contains('/') && !Path::new(program).exists() {
        anyhow::bail!("Device command '{}' not found", program);
    }

    // --- 4. Start Server ---
    info!(
        robot_address = %config.robot_address,
        language = %config.language,
        volume = config.volume,
        bind_address = %config.bind_address,
        "Bridge configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    let app = create_router(Arc::new(AppState::new(config)));

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
