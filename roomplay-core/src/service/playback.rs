//! Playback coordination service
//!
//! Owns the write path for every transport command, from either control
//! surface: serialize on the room's command lock, run the pure controller
//! transition, mirror to the durable store, then broadcast. Broadcasts carry
//! the server clock reading used for the transition and are only emitted
//! after the durable write succeeds; a failed write rolls the registry back
//! so memory and mirror never disagree past one synchronous write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::{
    controller,
    ingest::MediaStorage,
    models::{MediaDescriptor, MediaKind, PlaybackSnapshot, PlaybackState, RoomId, UserId},
    registry::RoomStateRegistry,
    repository::PlaybackStore,
    service::{events::PlaybackEvent, recovery::RecoveryLoader, PlaybackBroadcaster},
    Error, Result,
};

#[derive(Clone)]
pub struct PlaybackService {
    registry: RoomStateRegistry,
    store: Arc<dyn PlaybackStore>,
    recovery: RecoveryLoader,
    /// Fan-out seam; wired by the API layer where the channel hub lives.
    broadcaster: Option<Arc<dyn PlaybackBroadcaster>>,
    /// File-system collaborator told about orphaned media after a stop.
    media_storage: Option<Arc<dyn MediaStorage>>,
    /// One command lock per room: transitions for a room are linearized,
    /// rooms proceed fully in parallel.
    room_locks: Arc<DashMap<RoomId, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for PlaybackService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackService").finish()
    }
}

impl PlaybackService {
    #[must_use]
    pub fn new(store: Arc<dyn PlaybackStore>) -> Self {
        let registry = RoomStateRegistry::new();
        let recovery = RecoveryLoader::new(registry.clone(), store.clone());
        Self {
            registry,
            store,
            recovery,
            broadcaster: None,
            media_storage: None,
            room_locks: Arc::new(DashMap::new()),
        }
    }

    /// Set the broadcaster that fans state changes out to room members.
    pub fn set_broadcaster(&mut self, broadcaster: Arc<dyn PlaybackBroadcaster>) {
        self.broadcaster = Some(broadcaster);
    }

    /// Set the storage collaborator notified of orphaned media files.
    pub fn set_media_storage(&mut self, storage: Arc<dyn MediaStorage>) {
        self.media_storage = Some(storage);
    }

    fn room_lock(&self, room_id: &RoomId) -> Arc<Mutex<()>> {
        self.room_locks
            .entry(room_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn emit(&self, room_id: &RoomId, event: PlaybackEvent) {
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.broadcast(room_id, event);
        }
    }

    /// Tell the storage collaborator to delete an orphaned media file.
    ///
    /// Spawned so the call never runs under a room's command lock; failures
    /// are logged, not surfaced — the playback transition already committed.
    fn schedule_media_removal(&self, locator: Option<String>) {
        let (Some(locator), Some(storage)) = (locator, self.media_storage.clone()) else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = storage.remove(&locator).await {
                tracing::warn!(
                    error = %e,
                    locator = %locator,
                    "Failed to remove orphaned media file"
                );
            }
        });
    }

    /// Run one serialized transition: lock, rehydrate, apply, persist,
    /// broadcast. Rolls the registry back if the durable write fails.
    async fn transition<F>(
        &self,
        room_id: &RoomId,
        kind: MediaKind,
        apply: F,
    ) -> Result<PlaybackSnapshot>
    where
        F: FnOnce(&PlaybackState, DateTime<Utc>) -> Result<PlaybackState>,
    {
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;

        self.recovery.ensure_loaded(room_id, kind).await?;
        let prev = self.registry.get(room_id, kind);

        let now = Utc::now();
        let next = apply(&prev, now)?;

        self.registry.set(next.clone());
        if let Err(e) = self.store.save(&next).await {
            self.registry.set(prev);
            return Err(e);
        }

        let snapshot = next.snapshot(now);
        self.emit(
            room_id,
            PlaybackEvent::StateChanged {
                state: snapshot.clone(),
                server_time: now,
            },
        );
        Ok(snapshot)
    }

    /// Start playback. The first play on an idle room establishes the caller
    /// as controlling host.
    pub async fn play(
        &self,
        room_id: &RoomId,
        kind: MediaKind,
        caller: &UserId,
        media: Option<MediaDescriptor>,
    ) -> Result<PlaybackSnapshot> {
        let snapshot = self
            .transition(room_id, kind, |state, now| {
                controller::play(state, media, caller, now)
            })
            .await?;
        tracing::info!(room_id = %room_id, kind = %kind, host = %caller, "Playback started");
        Ok(snapshot)
    }

    pub async fn pause(
        &self,
        room_id: &RoomId,
        kind: MediaKind,
        caller: &UserId,
        observed_offset_ms: i64,
    ) -> Result<PlaybackSnapshot> {
        self.transition(room_id, kind, |state, now| {
            controller::pause(state, observed_offset_ms, caller, now)
        })
        .await
    }

    pub async fn resume(
        &self,
        room_id: &RoomId,
        kind: MediaKind,
        caller: &UserId,
    ) -> Result<PlaybackSnapshot> {
        self.transition(room_id, kind, |state, now| {
            controller::resume(state, caller, now)
        })
        .await
    }

    pub async fn seek(
        &self,
        room_id: &RoomId,
        kind: MediaKind,
        caller: &UserId,
        target_offset_ms: i64,
    ) -> Result<PlaybackSnapshot> {
        self.transition(room_id, kind, |state, now| {
            controller::seek(state, target_offset_ms, caller, now)
        })
        .await
    }

    /// Host-issued stop: unload media, zero position, drop the registry
    /// entry and the durable mirror, and report the orphaned file.
    pub async fn stop(
        &self,
        room_id: &RoomId,
        kind: MediaKind,
        caller: &UserId,
    ) -> Result<PlaybackSnapshot> {
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;

        self.recovery.ensure_loaded(room_id, kind).await?;
        let prev = self.registry.get(room_id, kind);

        let now = Utc::now();
        let next = controller::stop(&prev, caller, now)?;

        self.registry.remove(room_id, kind);
        let orphan = match self.store.clear(room_id, kind).await {
            Ok(orphan) => orphan,
            Err(e) => {
                self.registry.set(prev);
                return Err(e);
            }
        };

        let snapshot = next.snapshot(now);
        self.emit(
            room_id,
            PlaybackEvent::StateChanged {
                state: snapshot.clone(),
                server_time: now,
            },
        );
        self.schedule_media_removal(orphan);
        tracing::info!(room_id = %room_id, kind = %kind, "Playback stopped");
        Ok(snapshot)
    }

    /// Live state for late joiners and the GET surface.
    ///
    /// Always computed from the current registry entry at the server clock,
    /// never a cached snapshot, so a participant joining mid-playback gets a
    /// position, not the stale start event.
    pub async fn snapshot(&self, room_id: &RoomId, kind: MediaKind) -> Result<PlaybackSnapshot> {
        Ok(self.snapshot_at(room_id, kind).await?.0)
    }

    /// Like [`snapshot`](Self::snapshot), also returning the clock reading
    /// the position was computed with, for events that carry `server_time`.
    pub async fn snapshot_at(
        &self,
        room_id: &RoomId,
        kind: MediaKind,
    ) -> Result<(PlaybackSnapshot, DateTime<Utc>)> {
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;

        self.recovery.ensure_loaded(room_id, kind).await?;
        let state = self.registry.get(room_id, kind);
        let now = Utc::now();
        Ok((state.snapshot(now), now))
    }

    /// Implicit stop when the controlling host drops off the channel while
    /// playback is running. Just another serialized stop command, but
    /// broadcast as `host_disconnected` so clients can tell the difference.
    pub async fn handle_host_disconnect(&self, room_id: &RoomId, user_id: &UserId) -> Result<()> {
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;

        for kind in MediaKind::ALL {
            self.recovery.ensure_loaded(room_id, kind).await?;
            if !self.registry.contains(room_id, kind) {
                continue;
            }

            let prev = self.registry.get(room_id, kind);
            if prev.controlling_user_id.as_ref() != Some(user_id) || !prev.is_playing {
                continue;
            }

            let now = Utc::now();
            let next = controller::force_stop(&prev, now);

            self.registry.remove(room_id, kind);
            let orphan = match self.store.clear(room_id, kind).await {
                Ok(orphan) => orphan,
                Err(e) => {
                    self.registry.set(prev);
                    return Err(e);
                }
            };

            tracing::info!(
                room_id = %room_id,
                kind = %kind,
                host = %user_id,
                "Host disconnected, playback stopped"
            );
            self.emit(
                room_id,
                PlaybackEvent::HostDisconnected {
                    kind,
                    state: next.snapshot(now),
                    server_time: now,
                },
            );
            self.schedule_media_removal(orphan);
        }
        Ok(())
    }

    /// Remove every trace of a room's playback. Unlike reads, explicit
    /// deletion of an unknown room is an error.
    ///
    /// The room's lock entry is kept: a command may already be awaiting it,
    /// and dropping the entry would hand a later command a fresh lock that
    /// does not serialize against the waiter.
    pub async fn delete_room(&self, room_id: &RoomId) -> Result<()> {
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;

        let mut known = false;
        for kind in MediaKind::ALL {
            if self.registry.contains(room_id, kind)
                || self.store.load(room_id, kind).await?.is_some()
            {
                known = true;
            }
        }
        if !known {
            return Err(Error::RoomNotFound(room_id.to_string()));
        }

        for kind in MediaKind::ALL {
            let prev = self.registry.remove(room_id, kind);
            match self.store.clear(room_id, kind).await {
                Ok(orphan) => self.schedule_media_removal(orphan),
                Err(e) => {
                    if let Some(prev) = prev {
                        self.registry.set(prev);
                    }
                    return Err(e);
                }
            }
        }

        tracing::info!(room_id = %room_id, "Room playback state deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryPlaybackStore;
    use parking_lot::Mutex as SyncMutex;

    /// Test broadcaster that records every event it sees.
    #[derive(Clone, Default)]
    struct RecordingBroadcaster {
        events: Arc<SyncMutex<Vec<PlaybackEvent>>>,
    }

    impl RecordingBroadcaster {
        fn events(&self) -> Vec<PlaybackEvent> {
            self.events.lock().clone()
        }
    }

    impl PlaybackBroadcaster for RecordingBroadcaster {
        fn broadcast(&self, _room_id: &RoomId, event: PlaybackEvent) {
            self.events.lock().push(event);
        }
    }

    fn room() -> RoomId {
        RoomId::from_string("room-1".to_string())
    }

    fn host() -> UserId {
        UserId::from_string("host-1".to_string())
    }

    fn media() -> MediaDescriptor {
        MediaDescriptor {
            name: "track.mp3".to_string(),
            size_bytes: 4_200_000,
            storage_locator: "media/room-1/track.mp3".to_string(),
        }
    }

    fn service_with(
        store: Arc<MemoryPlaybackStore>,
    ) -> (PlaybackService, RecordingBroadcaster) {
        let broadcaster = RecordingBroadcaster::default();
        let mut service = PlaybackService::new(store);
        service.set_broadcaster(Arc::new(broadcaster.clone()));
        (service, broadcaster)
    }

    #[tokio::test]
    async fn test_play_then_snapshot_reports_live_position() {
        let (service, broadcaster) = service_with(Arc::new(MemoryPlaybackStore::new()));

        let snap = service
            .play(&room(), MediaKind::Audio, &host(), Some(media()))
            .await
            .unwrap();
        assert!(snap.is_playing);
        assert_eq!(snap.position_ms, 0);

        let late = service.snapshot(&room(), MediaKind::Audio).await.unwrap();
        assert!(late.is_playing);
        assert!(late.position_ms >= 0);
        assert_eq!(late.media, Some(media()));

        let events = broadcaster.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "state_changed");
    }

    #[tokio::test]
    async fn test_persistence_failure_rolls_back_and_does_not_broadcast() {
        let store = Arc::new(MemoryPlaybackStore::new());
        let (service, broadcaster) = service_with(store.clone());

        store.fail_next_write();
        let err = service
            .play(&room(), MediaKind::Audio, &host(), Some(media()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));

        // Rolled back: still the empty default, nothing broadcast, nothing
        // in the durable store.
        let snap = service.snapshot(&room(), MediaKind::Audio).await.unwrap();
        assert!(!snap.is_playing);
        assert!(snap.media.is_none());
        assert!(broadcaster.events().is_empty());
        assert!(store.load(&room(), MediaKind::Audio).await.unwrap().is_none());

        // The failure is transient; a resubmit succeeds.
        service
            .play(&room(), MediaKind::Audio, &host(), Some(media()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_pause_then_seek_both_apply() {
        let (service, _) = service_with(Arc::new(MemoryPlaybackStore::new()));
        service
            .play(&room(), MediaKind::Audio, &host(), Some(media()))
            .await
            .unwrap();

        service
            .pause(&room(), MediaKind::Audio, &host(), 5000)
            .await
            .unwrap();
        let snap = service
            .seek(&room(), MediaKind::Audio, &host(), 42_000)
            .await
            .unwrap();

        // Both commands took effect: the pause's is_playing=false survived
        // the seek, and the seek's target survived as the paused offset.
        assert!(!snap.is_playing);
        assert_eq!(snap.position_ms, 42_000);
    }

    #[tokio::test]
    async fn test_concurrent_seeks_leave_memory_and_mirror_consistent() {
        let store = Arc::new(MemoryPlaybackStore::new());
        let (service, _) = service_with(store.clone());
        service
            .play(&room(), MediaKind::Video, &host(), Some(media()))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .seek(&room(), MediaKind::Video, &host(), i * 1000)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let persisted = store.load(&room(), MediaKind::Video).await.unwrap().unwrap();
        let live = service.snapshot(&room(), MediaKind::Video).await.unwrap();
        let now = Utc::now();
        // Linearized per room: no torn state between memory and mirror.
        assert_eq!(persisted.is_playing, live.is_playing);
        assert!((persisted.position_ms(now) - live.position_ms).abs() < 2000);
    }

    #[tokio::test]
    async fn test_non_host_commands_are_rejected_and_state_unchanged() {
        let (service, _) = service_with(Arc::new(MemoryPlaybackStore::new()));
        let viewer = UserId::from_string("viewer-2".to_string());

        service
            .play(&room(), MediaKind::Audio, &host(), Some(media()))
            .await
            .unwrap();

        let err = service
            .pause(&room(), MediaKind::Audio, &viewer, 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAuthorized(_)));

        let snap = service.snapshot(&room(), MediaKind::Audio).await.unwrap();
        assert!(snap.is_playing);
        assert_eq!(snap.controlling_user_id, Some(host()));
    }

    #[tokio::test]
    async fn test_host_disconnect_stops_playing_kind_only() {
        let store = Arc::new(MemoryPlaybackStore::new());
        let (service, broadcaster) = service_with(store.clone());

        // Audio playing, video paused: only audio gets the implicit stop.
        service
            .play(&room(), MediaKind::Audio, &host(), Some(media()))
            .await
            .unwrap();
        service
            .play(&room(), MediaKind::Video, &host(), Some(media()))
            .await
            .unwrap();
        service
            .pause(&room(), MediaKind::Video, &host(), 3000)
            .await
            .unwrap();

        service.handle_host_disconnect(&room(), &host()).await.unwrap();

        let audio = service.snapshot(&room(), MediaKind::Audio).await.unwrap();
        assert!(!audio.is_playing);
        assert!(audio.media.is_none());
        assert!(store.load(&room(), MediaKind::Audio).await.unwrap().is_none());

        let video = service.snapshot(&room(), MediaKind::Video).await.unwrap();
        assert_eq!(video.position_ms, 3000);

        let events = broadcaster.events();
        assert_eq!(
            events
                .iter()
                .filter(|e| e.event_type() == "host_disconnected")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_disconnect_of_non_host_is_a_no_op() {
        let (service, broadcaster) = service_with(Arc::new(MemoryPlaybackStore::new()));
        let viewer = UserId::from_string("viewer-2".to_string());

        service
            .play(&room(), MediaKind::Audio, &host(), Some(media()))
            .await
            .unwrap();
        service.handle_host_disconnect(&room(), &viewer).await.unwrap();

        let snap = service.snapshot(&room(), MediaKind::Audio).await.unwrap();
        assert!(snap.is_playing);
        assert!(broadcaster
            .events()
            .iter()
            .all(|e| e.event_type() != "host_disconnected"));
    }

    #[tokio::test]
    async fn test_delete_unknown_room_is_room_not_found() {
        let (service, _) = service_with(Arc::new(MemoryPlaybackStore::new()));
        let err = service
            .delete_room(&RoomId::from_string("ghost".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RoomNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_room_clears_registry_and_store() {
        let store = Arc::new(MemoryPlaybackStore::new());
        let (service, _) = service_with(store.clone());

        service
            .play(&room(), MediaKind::Audio, &host(), Some(media()))
            .await
            .unwrap();
        service.delete_room(&room()).await.unwrap();

        assert!(store.load(&room(), MediaKind::Audio).await.unwrap().is_none());
        let snap = service.snapshot(&room(), MediaKind::Audio).await.unwrap();
        assert!(!snap.is_playing);
        assert!(snap.media.is_none());
    }

    #[tokio::test]
    async fn test_commands_racing_a_delete_stay_serialized() {
        let store = Arc::new(MemoryPlaybackStore::new());
        let (service, _) = service_with(store.clone());

        service
            .play(&room(), MediaKind::Audio, &host(), Some(media()))
            .await
            .unwrap();
        service.delete_room(&room()).await.unwrap();

        // Distinct users race to restart the room. Serialized, exactly one
        // establishes itself as host and the rest are rejected against it.
        let mut handles = Vec::new();
        for i in 0..8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                let user = UserId::from_string(format!("dj-{i}"));
                service
                    .play(&room(), MediaKind::Audio, &user, Some(media()))
                    .await
                    .map(|_| user)
            }));
        }
        let mut winners = Vec::new();
        for handle in handles {
            if let Ok(user) = handle.await.unwrap() {
                winners.push(user);
            }
        }
        assert_eq!(winners.len(), 1);

        // Memory and mirror agree on who won.
        let live = service.snapshot(&room(), MediaKind::Audio).await.unwrap();
        let persisted = store.load(&room(), MediaKind::Audio).await.unwrap().unwrap();
        assert_eq!(live.controlling_user_id.as_ref(), Some(&winners[0]));
        assert_eq!(persisted.controlling_user_id, live.controlling_user_id);
    }

    #[tokio::test]
    async fn test_restart_recovers_play_position() {
        let store = Arc::new(MemoryPlaybackStore::new());
        let (service, _) = service_with(store.clone());

        service
            .play(&room(), MediaKind::Audio, &host(), Some(media()))
            .await
            .unwrap();
        service
            .seek(&room(), MediaKind::Audio, &host(), 90_000)
            .await
            .unwrap();

        // Fresh service over the same store simulates a process restart.
        let (restarted, _) = service_with(store);
        let snap = restarted.snapshot(&room(), MediaKind::Audio).await.unwrap();
        assert!(snap.is_playing);
        assert!(snap.position_ms >= 90_000);
        assert!(snap.position_ms < 92_000);
        assert_eq!(snap.controlling_user_id, Some(host()));
    }
}
