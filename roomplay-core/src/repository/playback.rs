use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{
    models::{MediaDescriptor, MediaKind, PlaybackState, RoomId, UserId},
    Error, Result,
};

use super::PlaybackStore;

/// PostgreSQL-backed playback state store
#[derive(Clone)]
pub struct PgPlaybackStore {
    pool: PgPool,
}

impl PgPlaybackStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convert a database row to a `PlaybackState`
    fn row_to_state(&self, row: &PgRow) -> Result<PlaybackState> {
        let kind: String = row.try_get("kind")?;
        let kind: MediaKind = kind
            .parse()
            .map_err(|_| Error::Internal(format!("Unknown media kind in store: {kind}")))?;

        let media_name: Option<String> = row.try_get("media_name")?;
        let media = match media_name {
            Some(name) => Some(MediaDescriptor {
                name,
                size_bytes: row.try_get("media_size_bytes")?,
                storage_locator: row.try_get("media_locator")?,
            }),
            None => None,
        };

        let controlling: Option<String> = row.try_get("controlling_user_id")?;

        Ok(PlaybackState {
            room_id: RoomId::from_string(row.try_get("room_id")?),
            kind,
            media,
            is_playing: row.try_get("is_playing")?,
            started_at: row.try_get("started_at")?,
            paused_offset_ms: row.try_get("paused_offset_ms")?,
            controlling_user_id: controlling.map(UserId::from_string),
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl PlaybackStore for PgPlaybackStore {
    async fn save(&self, state: &PlaybackState) -> Result<()> {
        let media_name = state.media.as_ref().map(|m| m.name.as_str());
        let media_size = state.media.as_ref().map(|m| m.size_bytes);
        let media_locator = state.media.as_ref().map(|m| m.storage_locator.as_str());
        let controlling = state.controlling_user_id.as_ref().map(UserId::as_str);

        sqlx::query(
            "INSERT INTO room_playback_state
                 (room_id, kind, media_name, media_size_bytes, media_locator,
                  is_playing, started_at, paused_offset_ms, controlling_user_id, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (room_id, kind) DO UPDATE
             SET media_name = EXCLUDED.media_name,
                 media_size_bytes = EXCLUDED.media_size_bytes,
                 media_locator = EXCLUDED.media_locator,
                 is_playing = EXCLUDED.is_playing,
                 started_at = EXCLUDED.started_at,
                 paused_offset_ms = EXCLUDED.paused_offset_ms,
                 controlling_user_id = EXCLUDED.controlling_user_id,
                 updated_at = EXCLUDED.updated_at
             WHERE room_playback_state.updated_at <= EXCLUDED.updated_at",
        )
        .bind(state.room_id.as_str())
        .bind(state.kind.as_str())
        .bind(media_name)
        .bind(media_size)
        .bind(media_locator)
        .bind(state.is_playing)
        .bind(state.started_at)
        .bind(state.paused_offset_ms)
        .bind(controlling)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&self, room_id: &RoomId, kind: MediaKind) -> Result<Option<PlaybackState>> {
        let row = sqlx::query(
            "SELECT room_id, kind, media_name, media_size_bytes, media_locator,
                    is_playing, started_at, paused_offset_ms, controlling_user_id, updated_at
             FROM room_playback_state
             WHERE room_id = $1 AND kind = $2",
        )
        .bind(room_id.as_str())
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_state(&row)?)),
            None => Ok(None),
        }
    }

    async fn clear(&self, room_id: &RoomId, kind: MediaKind) -> Result<Option<String>> {
        let row = sqlx::query(
            "DELETE FROM room_playback_state
             WHERE room_id = $1 AND kind = $2
             RETURNING media_locator",
        )
        .bind(room_id.as_str())
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.try_get("media_locator")?),
            None => Ok(None),
        }
    }
}
