//! TermBridge Server
//!
//! WebSocket terminal session manager for the browser IDE.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use server::config::Config;
use server::http::{router, AppState};

/// How often the registry checks idle deadlines.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// TermBridge server - interactive terminal sessions over WebSockets.
#[derive(Parser, Debug)]
#[command(name = "termbridge-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Validate configuration
    config.validate()?;

    // Initialize tracing
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.daemon.log_level.clone()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("TermBridge server starting...");

    let state = AppState::new(config);
    let registry = Arc::clone(&state.registry);
    registry.start_sweeper(SWEEP_INTERVAL);

    let addr = format!("{}:{}", state.config.server.bind, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on port {}", state.config.server.port);

    let app = router(state);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = wait_for_shutdown_signal() => {
            tracing::info!("Received shutdown signal");
        }
    }

    // Kill remaining containers before exiting; auto-remove cleans up the
    // engine side once they stop.
    registry.shutdown().await;
    tracing::info!("All sessions terminated, exiting");

    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
}
