//! emotrack-fusion - session emotion aggregation service
//!
//! Accepts per-frame classifier outputs (or raw frames, when inference
//! collaborators are configured) for a session and reports one emotion
//! label per source when the session stops.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use emotrack_common::config::{ConfigOverrides, ServiceConfig};
use emotrack_fusion::collaborators::Collaborators;
use emotrack_fusion::engine::FusionEngine;
use emotrack_fusion::{build_router, db, reaper, AppState};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for emotrack-fusion
#[derive(Parser, Debug)]
#[command(name = "emotrack-fusion")]
#[command(about = "Session emotion aggregation and fusion service")]
#[command(version)]
struct Args {
    /// Path to emotrack.toml
    #[arg(short, long, env = "EMOTRACK_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "EMOTRACK_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(short, long, env = "EMOTRACK_BIND")]
    bind: Option<String>,

    /// SQLite database for finalized results
    #[arg(short, long, env = "EMOTRACK_DATABASE")]
    database: Option<PathBuf>,

    /// Required value of the Authorization header (empty disables auth)
    #[arg(long, env = "EMOTRACK_AUTHORIZATION_KEY", hide_env_values = true)]
    authorization_key: Option<String>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, env = "EMOTRACK_LOG_LEVEL")]
    log_level: Option<String>,
}

impl From<Args> for ConfigOverrides {
    fn from(args: Args) -> Self {
        ConfigOverrides {
            config_path: args.config,
            bind_address: args.bind,
            port: args.port,
            database_path: args.database,
            authorization_key: args.authorization_key,
            log_level: args.log_level,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Bootstrap configuration decides the default log level
    let config = ServiceConfig::resolve(args.into()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "emotrack_fusion={level},emotrack_common={level},tower_http={level}",
                    level = config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build identification first, before any I/O
    info!(
        "Starting emotrack-fusion v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    info!("Database path: {}", config.database_path.display());
    let pool = match db::init_database_pool(&config.database_path).await {
        Ok(pool) => {
            info!("✓ Connected to database");
            pool
        }
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return Err(e.into());
        }
    };

    if config.authorization_key.is_none() {
        warn!("No authorization key configured; API authentication disabled");
    }

    let collaborators =
        Collaborators::from_config(&config).context("Failed to configure collaborators")?;

    let engine = Arc::new(FusionEngine::new());
    let cancel_token = CancellationToken::new();
    let reaper_handle = reaper::spawn_idle_reaper(
        Arc::clone(&engine),
        config.idle_timeout,
        config.sweep_interval,
        cancel_token.clone(),
    );

    let state = AppState::new(
        engine,
        pool.clone(),
        collaborators,
        config.authorization_key.clone(),
    );
    let app = build_router(state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("emotrack-fusion listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cancel_token.cancel();
    if let Err(e) = reaper_handle.await {
        warn!("Idle-session reaper ended abnormally: {}", e);
    }
    pool.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
