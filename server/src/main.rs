//! Parley Server - Main Entry Point

use anyhow::{Context, Result};
use tracing::info;

use parley_server::{api, config, db};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Parley Server");

    let db_pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    db::run_migrations(&db_pool).await?;

    let redis = db::create_redis_client(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;

    let prune_interval = config.dm_spam_prune_interval();
    let bind_address = config.bind_address.clone();

    let state = api::AppState::new(db_pool, redis, config);
    state.spam_tracker.start(prune_interval);
    info!(
        interval_secs = prune_interval.as_secs(),
        "DM spam pruning started"
    );

    let spam_tracker = state.spam_tracker.clone();
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    info!(address = %bind_address, "Server listening");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    spam_tracker.stop();
    info!("Server shutdown complete");

    Ok(())
}
