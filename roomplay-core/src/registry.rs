//! In-process room playback state registry
//!
//! Single source of truth for live playback state while the process is up,
//! one entry per (room, media kind). Rooms are independent so the map itself
//! needs no cross-room coordination; per-room command serialization is owned
//! by the service layer, not here.

use std::sync::Arc;

use dashmap::DashMap;

use crate::models::{MediaKind, PlaybackState, RoomId};

type StateKey = (RoomId, MediaKind);

#[derive(Clone)]
pub struct RoomStateRegistry {
    states: Arc<DashMap<StateKey, PlaybackState>>,
}

impl RoomStateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            states: Arc::new(DashMap::new()),
        }
    }

    /// Current state for the room, lazily creating the empty default.
    /// Never errors.
    #[must_use]
    pub fn get(&self, room_id: &RoomId, kind: MediaKind) -> PlaybackState {
        self.states
            .entry((room_id.clone(), kind))
            .or_insert_with(|| PlaybackState::new(room_id.clone(), kind))
            .clone()
    }

    /// Whether an entry exists without creating one. Used by the recovery
    /// loader to decide if a room still needs rehydration.
    #[must_use]
    pub fn contains(&self, room_id: &RoomId, kind: MediaKind) -> bool {
        self.states.contains_key(&(room_id.clone(), kind))
    }

    /// Replace the state wholesale (controller transitions, recovery).
    pub fn set(&self, state: PlaybackState) {
        self.states
            .insert((state.room_id.clone(), state.kind), state);
    }

    /// Drop the entry (stop / room deletion). Returns the removed state.
    pub fn remove(&self, room_id: &RoomId, kind: MediaKind) -> Option<PlaybackState> {
        self.states
            .remove(&(room_id.clone(), kind))
            .map(|(_, state)| state)
    }

    /// Drop both media kinds for a room.
    pub fn remove_room(&self, room_id: &RoomId) {
        for kind in MediaKind::ALL {
            self.states.remove(&(room_id.clone(), kind));
        }
    }

    /// Number of live entries across all rooms (for monitoring).
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl Default for RoomStateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(id: &str) -> RoomId {
        RoomId::from_string(id.to_string())
    }

    #[test]
    fn test_get_creates_empty_default() {
        let registry = RoomStateRegistry::new();
        let state = registry.get(&room("r1"), MediaKind::Audio);
        assert!(!state.is_playing);
        assert!(state.media.is_none());
        assert_eq!(state.paused_offset_ms, 0);
        assert!(registry.contains(&room("r1"), MediaKind::Audio));
    }

    #[test]
    fn test_kinds_are_independent_entries() {
        let registry = RoomStateRegistry::new();
        let mut audio = registry.get(&room("r1"), MediaKind::Audio);
        audio.is_playing = true;
        registry.set(audio);

        assert!(registry.get(&room("r1"), MediaKind::Audio).is_playing);
        assert!(!registry.get(&room("r1"), MediaKind::Video).is_playing);
    }

    #[test]
    fn test_set_replaces_wholesale() {
        let registry = RoomStateRegistry::new();
        let mut state = registry.get(&room("r1"), MediaKind::Video);
        state.paused_offset_ms = 9000;
        registry.set(state);
        assert_eq!(
            registry.get(&room("r1"), MediaKind::Video).paused_offset_ms,
            9000
        );
    }

    #[test]
    fn test_remove_room_drops_both_kinds() {
        let registry = RoomStateRegistry::new();
        registry.get(&room("r1"), MediaKind::Audio);
        registry.get(&room("r1"), MediaKind::Video);
        registry.get(&room("r2"), MediaKind::Audio);

        registry.remove_room(&room("r1"));
        assert!(!registry.contains(&room("r1"), MediaKind::Audio));
        assert!(!registry.contains(&room("r1"), MediaKind::Video));
        assert!(registry.contains(&room("r2"), MediaKind::Audio));
    }
}
