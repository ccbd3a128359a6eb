//! WebSocket synchronization channel
//!
//! One connection per participant per room. On join the client immediately
//! receives a live `state_snapshot` for each media kind, computed from the
//! current registry entry, so late joiners get a position rather than the
//! original start event. Inbound commands route through the same
//! `PlaybackService` as the HTTP surface; command failures come back as an
//! `error` event on this connection without disturbing the room.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{error, info};

use roomplay_core::models::{MediaDescriptor, MediaKind, RoomId, UserId};
use roomplay_core::service::PlaybackEvent;

use super::{AppError, AppState};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication
    pub token: Option<String>,
}

/// Commands a client may send over the channel.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum ClientCommand {
    Play {
        kind: MediaKind,
        media: Option<MediaDescriptor>,
    },
    Pause {
        kind: MediaKind,
        observed_offset_ms: i64,
    },
    Resume {
        kind: MediaKind,
    },
    Seek {
        kind: MediaKind,
        target_offset_ms: i64,
    },
    Stop {
        kind: MediaKind,
    },
    /// Ask for a fresh snapshot of one kind (sent only to this connection).
    State {
        kind: MediaKind,
    },
}

/// WebSocket handler for a room's synchronization channel
///
/// Clients provide the JWT token via query parameter:
/// `ws://host/api/rooms/{room_id}/ws?token={jwt}`
pub async fn websocket_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let token = query
        .token
        .ok_or_else(|| AppError::unauthorized("Missing token query parameter"))?;

    let user_id = state
        .jwt
        .verify(&token)
        .map_err(|e| AppError::unauthorized(format!("Invalid token: {e}")))?;

    // 64KB is plenty for control traffic; the default is sized for payloads
    // this channel never carries.
    Ok(ws
        .max_message_size(64 * 1024)
        .on_upgrade(move |socket| handle_socket(socket, state, RoomId::from_string(room_id), user_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, room_id: RoomId, user_id: UserId) {
    let connection_id = nanoid::nanoid!(12);
    info!(
        room_id = %room_id,
        user_id = %user_id,
        connection_id = %connection_id,
        "WebSocket connection established"
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<PlaybackEvent>();
    state
        .hub
        .subscribe(room_id.clone(), user_id.clone(), connection_id.clone(), tx.clone());

    // Join reply: live snapshots for both media kinds.
    for kind in MediaKind::ALL {
        match state.playback_service.snapshot_at(&room_id, kind).await {
            Ok((snapshot, now)) => {
                let _ = tx.send(PlaybackEvent::StateSnapshot {
                    state: snapshot,
                    server_time: now,
                });
            }
            Err(e) => {
                let _ = tx.send(PlaybackEvent::Error {
                    message: e.to_string(),
                });
            }
        }
    }

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: serialize events to the socket.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!(error = %e, "Failed to serialize playback event");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Reader loop: decode and dispatch commands.
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientCommand>(&text) {
                Ok(command) => {
                    if let Err(e) = dispatch(&state, &room_id, &user_id, command, &tx).await {
                        let _ = tx.send(PlaybackEvent::Error {
                            message: e.to_string(),
                        });
                    }
                }
                Err(e) => {
                    let _ = tx.send(PlaybackEvent::Error {
                        message: format!("Malformed command: {e}"),
                    });
                }
            },
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {
                // Ignore binary, ping and pong frames.
            }
        }
    }

    state.hub.unsubscribe(&connection_id);
    drop(tx); // all senders gone, the writer drains and exits

    // A user with another tab or device still connected has not left the
    // room; the implicit stop applies only when their last connection closed.
    if state.hub.user_connection_count(&room_id, &user_id) == 0 {
        // If the departing user was the controlling host of a playing kind,
        // this enqueues the implicit stop through the room's command lock.
        if let Err(e) = state
            .playback_service
            .handle_host_disconnect(&room_id, &user_id)
            .await
        {
            error!(
                error = %e,
                room_id = %room_id,
                user_id = %user_id,
                "Host-disconnect cleanup failed"
            );
        }
    }

    let _ = writer.await;
    info!(
        room_id = %room_id,
        user_id = %user_id,
        connection_id = %connection_id,
        "WebSocket connection closed"
    );
}

async fn dispatch(
    state: &AppState,
    room_id: &RoomId,
    user_id: &UserId,
    command: ClientCommand,
    tx: &mpsc::UnboundedSender<PlaybackEvent>,
) -> roomplay_core::Result<()> {
    let service = &state.playback_service;
    match command {
        ClientCommand::Play { kind, media } => {
            service.play(room_id, kind, user_id, media).await?;
        }
        ClientCommand::Pause {
            kind,
            observed_offset_ms,
        } => {
            service.pause(room_id, kind, user_id, observed_offset_ms).await?;
        }
        ClientCommand::Resume { kind } => {
            service.resume(room_id, kind, user_id).await?;
        }
        ClientCommand::Seek {
            kind,
            target_offset_ms,
        } => {
            service.seek(room_id, kind, user_id, target_offset_ms).await?;
        }
        ClientCommand::Stop { kind } => {
            service.stop(room_id, kind, user_id).await?;
        }
        ClientCommand::State { kind } => {
            let (snapshot, now) = service.snapshot_at(room_id, kind).await?;
            let _ = tx.send(PlaybackEvent::StateSnapshot {
                state: snapshot,
                server_time: now,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_shapes() {
        let play: ClientCommand = serde_json::from_str(
            r#"{"type":"play","data":{"kind":"audio","media":{"name":"a.mp3","size_bytes":10,"storage_locator":"media/a.mp3"}}}"#,
        )
        .unwrap();
        assert!(matches!(
            play,
            ClientCommand::Play {
                kind: MediaKind::Audio,
                media: Some(_)
            }
        ));

        let seek: ClientCommand = serde_json::from_str(
            r#"{"type":"seek","data":{"kind":"video","target_offset_ms":42000}}"#,
        )
        .unwrap();
        assert!(matches!(
            seek,
            ClientCommand::Seek {
                kind: MediaKind::Video,
                target_offset_ms: 42000
            }
        ));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let result = serde_json::from_str::<ClientCommand>(r#"{"type":"shuffle","data":{}}"#);
        assert!(result.is_err());
    }
}
