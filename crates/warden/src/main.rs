//! # Warden - admission gate for a chat server
//!
//! Holds every new member in a private verification thread until they solve
//! an image challenge, trips a circuit breaker when the join stream looks
//! like a raid, and grants a full or provisional access role on success.
//!
//! ## Architecture
//! ```text
//! Platform bridge ─► /events/* ─► AdmissionGate ─► MembershipDirectory
//!                                   │    │
//!                       CircuitBreaker  ChallengePool ◄─ pool worker
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod breaker;
mod captcha;
mod config;
mod directory;
mod gate;
mod routes;
mod scoring;
mod session;
mod state;
mod timers;

use captcha::{ChallengePool, StrokeCaptcha, pool_worker};
use crate::config::AppConfig;
use directory::LocalDirectory;
use gate::{AdmissionGate, audit_worker, breaker_worker, regularization_worker};
use state::AppState;

/// Warden - member admission gate
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/warden.toml", env = "WARDEN_CONFIG")]
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
    // .env is optional
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!("🛡️ Starting Warden v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::load(&args.config, &args)?;
    info!("📋 Configuration loaded from {}", args.config);

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    // Challenge pool (pre-rendered CAPTCHAs)
    let source = Arc::new(StrokeCaptcha::new(&config.challenge));
    let pool = Arc::new(ChallengePool::new(source, config.challenge.pool_capacity));
    tokio::spawn(pool_worker(pool.clone(), shutdown_tx.subscribe()));

    // In-memory directory: actions are logged, nobody is actually removed
    let guild = &config.guild;
    let directory = Arc::new(
        LocalDirectory::new()
            .with_channel(guild.welcome_channel)
            .with_role(guild.full_role)
            .with_role(guild.provisional_role),
    );
    info!("🧪 Using in-memory directory (dry run)");

    // Admission gate
    let gate = AdmissionGate::new(config.clone(), directory, pool);
    gate.start().await.context("Admission gate refused to start")?;
    info!("✅ Admission gate started for {}", config.guild.name);

    tokio::spawn(audit_worker(gate.subscribe(), shutdown_tx.subscribe()));
    tokio::spawn(breaker_worker(gate.clone(), shutdown_tx.subscribe()));
    tokio::spawn(regularization_worker(gate.clone(), shutdown_tx.subscribe()));

    // Build router
    let app = routes::create_router(AppState::new(gate));

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("🚀 Warden listening on {}", config.listen_addr);

    // Handle graceful shutdown
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("🛑 Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("👋 Warden shutdown complete");
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
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
