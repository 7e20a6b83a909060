//! Turnstile server binary.
//!
//! # Usage
//!
//! ```bash
//! # Start with built-in defaults (port 3030, room creation allowed)
//! turnstile-server
//!
//! # Start from a configuration file, overriding the port
//! turnstile-server --config turnstile.json --port 8080
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use turnstile_core::ServerConfig;
use turnstile_server::Server;

/// Turnstile room admission server
#[derive(Parser, Debug)]
#[command(name = "turnstile-server")]
#[command(about = "Room admission coordinator with queued access")]
#[command(version)]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port (overrides the configuration file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }

    let default_level = if config.debug { "debug" } else { args.log_level.as_str() };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("turnstile server starting");
    tracing::info!(
        rooms = config.rooms.len(),
        allow_new_rooms = config.allow_new_rooms,
        "configuration loaded"
    );

    let server = Server::bind(config).await?;
    tracing::info!("listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
