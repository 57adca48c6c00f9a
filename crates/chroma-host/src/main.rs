//! # Controller Host
//!
//! The operator-facing host process for the chromatography controller. It
//! owns the command link to the device (serial port or emulator socket)
//! and exposes the HTTP/JSON interface the browser UI consumes.
//!
//! ## Responsibilities
//!
//! *   Speaking the framed command-link protocol to the controller.
//! *   Converting operator program descriptions (JSON) into binary steps
//!     and transferring them block by block.
//! *   Serving device status and manual controls over HTTP.
//!
//! ## Concurrency
//!
//! The HTTP handlers share one serialized device client: the link is a
//! strict request/response protocol, so commands queue on a mutex rather
//! than interleaving on the wire.

// Use mimalloc for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

mod api;
mod config;
mod device_client;
mod state;

use config::HostConfig;
use device_client::DeviceClient;

/// Operator host for the chromatography controller.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the host configuration file.
    #[arg(short, long, default_value = "chroma.cfg")]
    config_path: PathBuf,

    /// Override the device link (serial path or `unix:<socket>`).
    #[arg(long)]
    device: Option<String>,

    /// Override the web server port for the API and UI.
    #[arg(long)]
    web_port: Option<u16>,
}

#[actix_rt::main]
async fn main() -> Result<()> {
    // Initialize the logging subscriber.
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    // 1. Load configuration; a missing file just means defaults.
    let mut config = if cli.config_path.exists() {
        info!("Loading configuration from: {:?}", cli.config_path);
        HostConfig::load(&cli.config_path)?
    } else {
        info!(
            "No configuration at {:?}, using defaults",
            cli.config_path
        );
        HostConfig::default()
    };
    if let Some(device) = cli.device {
        config.device.port = device;
    }
    if let Some(port) = cli.web_port {
        config.web.port = port;
    }

    // 2. Establish the command link.
    info!(
        "Connecting to controller at {} ({} baud)",
        config.device.port, config.device.baud
    );
    let mut client = DeviceClient::connect(&config.device.port, config.device.baud).await?;
    client
        .ping()
        .await
        .context("controller did not answer ping")?;
    info!("Controller link established.");

    // 3. Start the API server.
    let app_state = api::AppState {
        client: Arc::new(tokio::sync::Mutex::new(client)),
    };
    let server = api::start_api_server(config.web.port, app_state)?;
    info!("API server started on port {}.", config.web.port);

    // 4. Run until the server exits or Ctrl+C arrives.
    tokio::select! {
        res = server => {
            res?;
            info!("API server shut down.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting.");
        }
    }

    Ok(())
}
