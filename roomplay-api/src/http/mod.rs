// Module: http
// HTTP/JSON surface: request/response playback control plus the WebSocket
// synchronization channel.

pub mod error;
pub mod playback;
pub mod websocket;

use std::sync::Arc;

use axum::{
    http::HeaderMap,
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use roomplay_core::ingest::MediaIngest;
use roomplay_core::models::UserId;
use roomplay_core::service::PlaybackService;

use crate::auth::JwtService;
use crate::hub::RoomChannelHub;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub playback_service: Arc<PlaybackService>,
    pub hub: Arc<RoomChannelHub>,
    pub jwt: Arc<JwtService>,
    pub media_ingest: Arc<dyn MediaIngest>,
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint (for monitoring probes)
        .route("/healthz", get(health))
        // Request surface: one call per control action
        .route(
            "/api/rooms/{room_id}/playback/{kind}",
            get(playback::get_state),
        )
        .route(
            "/api/rooms/{room_id}/playback/{kind}/play",
            post(playback::play),
        )
        .route(
            "/api/rooms/{room_id}/playback/{kind}/pause",
            post(playback::pause),
        )
        .route(
            "/api/rooms/{room_id}/playback/{kind}/resume",
            post(playback::resume),
        )
        .route(
            "/api/rooms/{room_id}/playback/{kind}/seek",
            post(playback::seek),
        )
        .route(
            "/api/rooms/{room_id}/playback/{kind}/stop",
            post(playback::stop),
        )
        // Media ingestion contract
        .route("/api/rooms/{room_id}/media", post(playback::ingest_media))
        // Room lifecycle
        .route("/api/rooms/{room_id}", delete(playback::delete_room))
        // Real-time synchronization channel
        .route("/api/rooms/{room_id}/ws", get(websocket::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Extract and validate the bearer token, yielding the caller id.
pub(crate) fn require_caller(state: &AppState, headers: &HeaderMap) -> Result<UserId, AppError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::unauthorized("Expected Bearer token"))?;

    state
        .jwt
        .verify(token)
        .map_err(|e| AppError::unauthorized(format!("Invalid token: {e}")))
}
