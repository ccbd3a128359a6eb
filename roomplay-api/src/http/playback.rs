//! Request/response playback control
//!
//! Thin surface for clients that cannot hold a live connection. Every handler
//! routes through the same `PlaybackService` path as the WebSocket channel,
//! so the two entry points cannot diverge.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use roomplay_core::ingest::MediaUpload;
use roomplay_core::models::{MediaDescriptor, MediaKind, PlaybackSnapshot, RoomId};

use super::{require_caller, AppError, AppResult, AppState};

fn parse_kind(kind: &str) -> Result<MediaKind, AppError> {
    kind.parse::<MediaKind>().map_err(AppError::from)
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    /// Omit to replay the already-loaded media from the start.
    pub media: Option<MediaDescriptor>,
}

#[derive(Debug, Deserialize)]
pub struct PauseRequest {
    pub observed_offset_ms: i64,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub target_offset_ms: i64,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub name: String,
    pub size_bytes: i64,
    /// Staging reference of the uploaded bytes.
    pub source: String,
}

pub async fn play(
    State(state): State<AppState>,
    Path((room_id, kind)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<PlayRequest>,
) -> AppResult<Json<PlaybackSnapshot>> {
    let caller = require_caller(&state, &headers)?;
    let kind = parse_kind(&kind)?;
    let room_id = RoomId::from_string(room_id);

    let snapshot = state
        .playback_service
        .play(&room_id, kind, &caller, req.media)
        .await?;
    Ok(Json(snapshot))
}

pub async fn pause(
    State(state): State<AppState>,
    Path((room_id, kind)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<PauseRequest>,
) -> AppResult<Json<PlaybackSnapshot>> {
    let caller = require_caller(&state, &headers)?;
    let kind = parse_kind(&kind)?;
    let room_id = RoomId::from_string(room_id);

    let snapshot = state
        .playback_service
        .pause(&room_id, kind, &caller, req.observed_offset_ms)
        .await?;
    Ok(Json(snapshot))
}

pub async fn resume(
    State(state): State<AppState>,
    Path((room_id, kind)): Path<(String, String)>,
    headers: HeaderMap,
) -> AppResult<Json<PlaybackSnapshot>> {
    let caller = require_caller(&state, &headers)?;
    let kind = parse_kind(&kind)?;
    let room_id = RoomId::from_string(room_id);

    let snapshot = state
        .playback_service
        .resume(&room_id, kind, &caller)
        .await?;
    Ok(Json(snapshot))
}

pub async fn seek(
    State(state): State<AppState>,
    Path((room_id, kind)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<SeekRequest>,
) -> AppResult<Json<PlaybackSnapshot>> {
    let caller = require_caller(&state, &headers)?;
    let kind = parse_kind(&kind)?;
    let room_id = RoomId::from_string(room_id);

    let snapshot = state
        .playback_service
        .seek(&room_id, kind, &caller, req.target_offset_ms)
        .await?;
    Ok(Json(snapshot))
}

pub async fn stop(
    State(state): State<AppState>,
    Path((room_id, kind)): Path<(String, String)>,
    headers: HeaderMap,
) -> AppResult<Json<PlaybackSnapshot>> {
    let caller = require_caller(&state, &headers)?;
    let kind = parse_kind(&kind)?;
    let room_id = RoomId::from_string(room_id);

    let snapshot = state.playback_service.stop(&room_id, kind, &caller).await?;
    Ok(Json(snapshot))
}

/// Live state for late joiners and polling clients; position is computed at
/// the server clock, never served from a cached snapshot.
pub async fn get_state(
    State(state): State<AppState>,
    Path((room_id, kind)): Path<(String, String)>,
    headers: HeaderMap,
) -> AppResult<Json<PlaybackSnapshot>> {
    require_caller(&state, &headers)?;
    let kind = parse_kind(&kind)?;
    let room_id = RoomId::from_string(room_id);

    let snapshot = state.playback_service.snapshot(&room_id, kind).await?;
    Ok(Json(snapshot))
}

/// Hand an upload to the ingestion collaborator, returning the descriptor to
/// feed into `play`.
pub async fn ingest_media(
    State(state): State<AppState>,
    Path(_room_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<IngestRequest>,
) -> AppResult<Json<MediaDescriptor>> {
    require_caller(&state, &headers)?;

    let descriptor = state
        .media_ingest
        .ingest(MediaUpload {
            name: req.name,
            size_bytes: req.size_bytes,
            source: req.source,
        })
        .await?;
    Ok(Json(descriptor))
}

pub async fn delete_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    require_caller(&state, &headers)?;
    let room_id = RoomId::from_string(room_id);

    state.playback_service.delete_room(&room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
