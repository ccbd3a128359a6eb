//! Rehydration of room state after a process restart

use std::sync::Arc;

use crate::{
    models::{MediaKind, RoomId},
    registry::RoomStateRegistry,
    repository::PlaybackStore,
    Result,
};

/// Installs the durable mirror into the registry on first reference.
///
/// A state persisted with `is_playing=true` stays playing after recovery:
/// position recomputes from the persisted `started_at`, so a restart is
/// invisible to clients — no explicit resume logic.
#[derive(Clone)]
pub struct RecoveryLoader {
    registry: RoomStateRegistry,
    store: Arc<dyn PlaybackStore>,
}

impl RecoveryLoader {
    pub fn new(registry: RoomStateRegistry, store: Arc<dyn PlaybackStore>) -> Self {
        Self { registry, store }
    }

    /// Ensure the registry has an entry for (room, kind), loading from the
    /// durable store if the process has not touched this room yet.
    ///
    /// Callers must hold the room's command lock; this is one of the two
    /// documented I/O suspension points for a room's command sequence.
    pub async fn ensure_loaded(&self, room_id: &RoomId, kind: MediaKind) -> Result<()> {
        if self.registry.contains(room_id, kind) {
            return Ok(());
        }

        if let Some(state) = self.store.load(room_id, kind).await? {
            tracing::info!(
                room_id = %room_id,
                kind = %kind,
                is_playing = state.is_playing,
                "Rehydrated playback state from durable store"
            );
            self.registry.set(state);
        }
        // No persisted state: leave the registry to lazily create the empty
        // default on first get().
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MediaDescriptor, PlaybackState};
    use crate::repository::MemoryPlaybackStore;
    use chrono::{Duration, Utc};

    fn room() -> RoomId {
        RoomId::from_string("room-1".to_string())
    }

    #[tokio::test]
    async fn test_restart_keeps_playing_position() {
        let store = Arc::new(MemoryPlaybackStore::new());
        let now = Utc::now();

        // Persisted while playing, anchored 30s ago.
        let mut state = PlaybackState::new(room(), MediaKind::Audio);
        state.media = Some(MediaDescriptor {
            name: "set.mp3".to_string(),
            size_bytes: 10,
            storage_locator: "media/set.mp3".to_string(),
        });
        state.is_playing = true;
        state.started_at = Some(now - Duration::seconds(30));
        store.save(&state).await.unwrap();

        // Fresh registry simulates the restarted process.
        let registry = RoomStateRegistry::new();
        let loader = RecoveryLoader::new(registry.clone(), store);
        loader.ensure_loaded(&room(), MediaKind::Audio).await.unwrap();

        let recovered = registry.get(&room(), MediaKind::Audio);
        assert!(recovered.is_playing);
        assert_eq!(recovered.position_ms(now), 30_000);
    }

    #[tokio::test]
    async fn test_no_persisted_state_leaves_registry_lazy() {
        let registry = RoomStateRegistry::new();
        let loader = RecoveryLoader::new(registry.clone(), Arc::new(MemoryPlaybackStore::new()));
        loader.ensure_loaded(&room(), MediaKind::Video).await.unwrap();
        assert!(!registry.contains(&room(), MediaKind::Video));
    }

    #[tokio::test]
    async fn test_live_entry_is_not_overwritten() {
        let store = Arc::new(MemoryPlaybackStore::new());
        let mut persisted = PlaybackState::new(room(), MediaKind::Audio);
        persisted.paused_offset_ms = 111;
        store.save(&persisted).await.unwrap();

        let registry = RoomStateRegistry::new();
        let mut live = PlaybackState::new(room(), MediaKind::Audio);
        live.paused_offset_ms = 999;
        registry.set(live);

        let loader = RecoveryLoader::new(registry.clone(), store);
        loader.ensure_loaded(&room(), MediaKind::Audio).await.unwrap();
        assert_eq!(registry.get(&room(), MediaKind::Audio).paused_offset_ms, 999);
    }
}
