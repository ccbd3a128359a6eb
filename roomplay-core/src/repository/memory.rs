use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    models::{MediaKind, PlaybackState, RoomId},
    Error, Result,
};

use super::PlaybackStore;

/// In-memory playback store
///
/// Used when no database is configured (databaseless dev mode) and by tests.
/// Honors the same last-write-wins contract as the Postgres store, and can be
/// told to fail the next write to exercise rollback paths.
#[derive(Clone, Default)]
pub struct MemoryPlaybackStore {
    states: Arc<Mutex<HashMap<(RoomId, MediaKind), PlaybackState>>>,
    fail_next_write: Arc<AtomicBool>,
}

impl MemoryPlaybackStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `save` or `clear` fail with a persistence error.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    fn check_fail(&self) -> Result<()> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(Error::Persistence(
                "Injected store failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PlaybackStore for MemoryPlaybackStore {
    async fn save(&self, state: &PlaybackState) -> Result<()> {
        self.check_fail()?;
        let mut states = self.states.lock();
        let key = (state.room_id.clone(), state.kind);
        match states.get(&key) {
            // Last-write-wins by updated_at, same as the SQL upsert.
            Some(existing) if existing.updated_at > state.updated_at => {}
            _ => {
                states.insert(key, state.clone());
            }
        }
        Ok(())
    }

    async fn load(&self, room_id: &RoomId, kind: MediaKind) -> Result<Option<PlaybackState>> {
        Ok(self
            .states
            .lock()
            .get(&(room_id.clone(), kind))
            .cloned())
    }

    async fn clear(&self, room_id: &RoomId, kind: MediaKind) -> Result<Option<String>> {
        self.check_fail()?;
        Ok(self
            .states
            .lock()
            .remove(&(room_id.clone(), kind))
            .and_then(|state| state.media.map(|m| m.storage_locator)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaDescriptor;
    use chrono::Duration;

    fn room() -> RoomId {
        RoomId::from_string("room-1".to_string())
    }

    #[tokio::test]
    async fn test_save_load_clear() {
        let store = MemoryPlaybackStore::new();
        let mut state = PlaybackState::new(room(), MediaKind::Audio);
        state.media = Some(MediaDescriptor {
            name: "a.mp3".to_string(),
            size_bytes: 1,
            storage_locator: "media/a.mp3".to_string(),
        });
        store.save(&state).await.unwrap();

        let loaded = store.load(&room(), MediaKind::Audio).await.unwrap();
        assert_eq!(loaded, Some(state));

        let orphan = store.clear(&room(), MediaKind::Audio).await.unwrap();
        assert_eq!(orphan.as_deref(), Some("media/a.mp3"));
        assert!(store.load(&room(), MediaKind::Audio).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryPlaybackStore::new();
        let mut newer = PlaybackState::new(room(), MediaKind::Video);
        newer.paused_offset_ms = 100;

        let mut older = newer.clone();
        older.paused_offset_ms = 999;
        older.updated_at = newer.updated_at - Duration::seconds(10);

        store.save(&newer).await.unwrap();
        store.save(&older).await.unwrap();

        let loaded = store.load(&room(), MediaKind::Video).await.unwrap().unwrap();
        assert_eq!(loaded.paused_offset_ms, 100);
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let store = MemoryPlaybackStore::new();
        let state = PlaybackState::new(room(), MediaKind::Audio);

        store.fail_next_write();
        assert!(matches!(
            store.save(&state).await.unwrap_err(),
            Error::Persistence(_)
        ));
        store.save(&state).await.unwrap();
    }
}
