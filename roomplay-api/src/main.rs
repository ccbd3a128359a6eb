mod auth;
mod http;
mod hub;
mod ingest;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};

use roomplay_core::ingest::MediaIngest;
use roomplay_core::repository::{MemoryPlaybackStore, PgPlaybackStore, PlaybackStore};
use roomplay_core::service::PlaybackService;
use roomplay_core::{logging, Config};

use crate::auth::JwtService;
use crate::http::AppState;
use crate::hub::RoomChannelHub;
use crate::ingest::PassthroughIngest;

#[derive(Debug, Parser)]
#[command(name = "roomplay-api", about = "Roomplay playback synchronization server")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "ROOMPLAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}");
        eprintln!("Using default configuration");
        Config::default()
    });

    logging::init_logging(&config.logging)?;

    info!("Roomplay API server starting...");
    info!("HTTP address: {}", config.http_address());

    let store = build_store(&config).await?;

    let hub = Arc::new(RoomChannelHub::new());
    info!("Room channel hub initialized");

    let mut playback_service = PlaybackService::new(store);
    playback_service.set_broadcaster(hub.clone());
    info!("Playback service initialized");

    let jwt = Arc::new(JwtService::new(
        &config.jwt.secret,
        config.jwt.token_duration_hours,
    ));

    let media_ingest: Arc<dyn MediaIngest> = Arc::new(PassthroughIngest::new("media"));

    let state = AppState {
        playback_service: Arc::new(playback_service),
        hub,
        jwt,
        media_ingest,
    };
    let router = http::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.http_address()).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Pick the durable store: Postgres when configured, in-memory otherwise.
async fn build_store(config: &Config) -> Result<Arc<dyn PlaybackStore>> {
    if config.database.url.is_empty() {
        warn!("No database configured, playback state will not survive restarts");
        return Ok(Arc::new(MemoryPlaybackStore::new()));
    }

    info!("Connecting to database...");
    let pool: sqlx::PgPool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_seconds))
        .connect(config.database_url())
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {e}");
            anyhow::anyhow!("Database connection failed: {e}")
        })?;
    info!("Database connected successfully");

    info!("Running database migrations...");
    sqlx::migrate!("../migrations").run(&pool).await.map_err(|e| {
        error!("Failed to run migrations: {e}");
        anyhow::anyhow!("Migration failed: {e}")
    })?;
    info!("Migrations completed");

    Ok(Arc::new(PgPlaybackStore::new(pool)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received");
}
