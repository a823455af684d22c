//! Lumen Server: distributed session and real-time delivery layer.
//!
//! Main entry point that wires all crates together and starts the server.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use lumen_cache::StoreManager;
use lumen_core::config::AppConfig;
use lumen_core::types::ProcessId;

/// Command-line flags.
#[derive(Debug, Parser)]
#[command(name = "lumen-server", version, about = "Lumen comet server")]
struct Cli {
    /// Directory holding `default.toml` and the environment overlays.
    #[arg(long, default_value = "config")]
    config: String,

    /// Environment overlay to load (`{config}/{env}.toml`).
    #[arg(long, default_value = "development")]
    env: String,

    /// Override `server.port`.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config, &cli.env)
        .with_context(|| format!("Failed to load configuration from '{}'", cli.config))?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config
        .validate(&cli.env)
        .context("Invalid configuration")?;

    init_logging(&config);

    run(config, &cli.env).await
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig, env: &str) -> anyhow::Result<()> {
    let process_id = ProcessId::generate();
    tracing::info!(
        process_id = %process_id,
        env = %env,
        "Starting Lumen v{}",
        env!("CARGO_PKG_VERSION")
    );

    // ── Step 1: Shared store ─────────────────────────────────────
    tracing::info!(provider = %config.store.provider, "Connecting to shared store...");
    let stores = StoreManager::connect(&config.store)
        .await
        .context("Shared store initialization failed")?;

    // ── Step 2: Auth, engine and state ───────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let shutdown_grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let state = lumen_api::build_state(config, stores, process_id);

    // ── Step 3: Real-time engine ─────────────────────────────────
    state
        .engine
        .start()
        .await
        .context("Real-time engine failed to start")?;

    // ── Step 4: HTTP server ──────────────────────────────────────
    let engine = state.engine.clone();
    let app = lumen_api::build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Lumen server listening on {}", addr);

    // ── Step 5: Graceful shutdown ────────────────────────────────
    // Sockets are closed by the engine first, so upgraded connections do
    // not hold the HTTP server open.
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown...");
        if tokio::time::timeout(shutdown_grace, engine.shutdown())
            .await
            .is_err()
        {
            tracing::warn!("Real-time engine did not shut down within the grace period");
        }
    });

    server.await.context("Server error")?;

    tracing::info!("Lumen server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
