//! Playback events fanned out to room members

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MediaKind, PlaybackSnapshot, RoomId};

/// Room-scoped playback event.
///
/// `server_time` is the authoritative clock reading the transition was
/// computed with — clients use it, never their own clocks, so everyone
/// converges on the same position formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PlaybackEvent {
    /// Reply to a join: the live state computed at join time.
    StateSnapshot {
        state: PlaybackSnapshot,
        server_time: DateTime<Utc>,
    },
    /// A transition was accepted and durably written.
    StateChanged {
        state: PlaybackSnapshot,
        server_time: DateTime<Utc>,
    },
    /// Implicit stop because the controlling host dropped; distinct from a
    /// normal stop so clients can show a different message.
    HostDisconnected {
        kind: MediaKind,
        state: PlaybackSnapshot,
        server_time: DateTime<Utc>,
    },
    /// Command failure surfaced on the channel without dropping the
    /// connection.
    Error { message: String },
}

impl PlaybackEvent {
    /// Event type tag (for logging)
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::StateSnapshot { .. } => "state_snapshot",
            Self::StateChanged { .. } => "state_changed",
            Self::HostDisconnected { .. } => "host_disconnected",
            Self::Error { .. } => "error",
        }
    }
}

/// Fan-out seam between the playback service and the synchronization channel.
///
/// Implementations must be non-blocking (fire-and-forget): the service calls
/// this after the durable write succeeds, while still holding the room's
/// command lock.
pub trait PlaybackBroadcaster: Send + Sync {
    fn broadcast(&self, room_id: &RoomId, event: PlaybackEvent);
}
