//! Durable mirror of playback state
//!
//! The store lets a restarted process (or a second replica) recover playback
//! without losing position: `save` is an idempotent last-write-wins upsert and
//! `clear` reports the storage locator of any media file the stop orphaned so
//! the file-system collaborator can be told to delete it.

pub mod memory;
pub mod playback;

use async_trait::async_trait;

use crate::{
    models::{MediaKind, PlaybackState, RoomId},
    Result,
};

pub use memory::MemoryPlaybackStore;
pub use playback::PgPlaybackStore;

#[async_trait]
pub trait PlaybackStore: Send + Sync {
    /// Upsert the durable mirror. Idempotent; last write wins by `updated_at`.
    async fn save(&self, state: &PlaybackState) -> Result<()>;

    /// Load the persisted state, if any.
    async fn load(&self, room_id: &RoomId, kind: MediaKind) -> Result<Option<PlaybackState>>;

    /// Delete the persisted state, returning the storage locator of the media
    /// file that is now orphaned, if one was loaded.
    async fn clear(&self, room_id: &RoomId, kind: MediaKind) -> Result<Option<String>>;
}
