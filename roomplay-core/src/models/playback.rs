use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{RoomId, UserId};

/// Media kind controlled in a room.
///
/// Audio and video are independent state machines with the same shape; a room
/// holds one `PlaybackState` per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub const ALL: [Self; 2] = [Self::Audio, Self::Video];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown media kind: {other}"
            ))),
        }
    }
}

/// Identifies the currently loaded media, as produced by the ingestion
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub name: String,
    pub size_bytes: i64,
    pub storage_locator: String,
}

/// Authoritative description of one room's playback for one media kind.
///
/// Timing model: while playing, `started_at` is a wall-clock anchor with any
/// carried-over offset already baked in, so `now - started_at` is always the
/// elapsed playback time since the beginning of the track. While paused,
/// `paused_offset_ms` is the authoritative position and `started_at` is
/// meaningless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub room_id: RoomId,
    pub kind: MediaKind,
    pub media: Option<MediaDescriptor>,
    pub is_playing: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_offset_ms: i64,
    pub controlling_user_id: Option<UserId>,
    /// Last-write-wins tiebreak for the durable mirror.
    pub updated_at: DateTime<Utc>,
}

impl PlaybackState {
    /// Empty default installed on first reference to a room.
    #[must_use]
    pub fn new(room_id: RoomId, kind: MediaKind) -> Self {
        Self {
            room_id,
            kind,
            media: None,
            is_playing: false,
            started_at: None,
            paused_offset_ms: 0,
            controlling_user_id: None,
            updated_at: Utc::now(),
        }
    }

    /// Current playback position in milliseconds at `now`.
    ///
    /// Derived, never stored: computed from `started_at` while playing and
    /// from `paused_offset_ms` while paused, so late joiners and restarted
    /// processes converge on the same value.
    #[must_use]
    pub fn position_ms(&self, now: DateTime<Utc>) -> i64 {
        if self.is_playing {
            self.started_at
                .map(|anchor| (now - anchor).num_milliseconds().max(0))
                .unwrap_or(0)
        } else {
            self.paused_offset_ms
        }
    }

    /// Client-facing view with the derived position materialized at `now`.
    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> PlaybackSnapshot {
        PlaybackSnapshot {
            kind: self.kind,
            media: self.media.clone(),
            is_playing: self.is_playing,
            position_ms: self.position_ms(now),
            controlling_user_id: self.controlling_user_id.clone(),
        }
    }
}

/// What clients see: the state with position computed at a server clock
/// reading, not the raw timing anchors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub kind: MediaKind,
    pub media: Option<MediaDescriptor>,
    pub is_playing: bool,
    pub position_ms: i64,
    pub controlling_user_id: Option<UserId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn state() -> PlaybackState {
        PlaybackState::new(RoomId::from_string("room-1".to_string()), MediaKind::Audio)
    }

    #[test]
    fn test_position_paused() {
        let mut s = state();
        s.paused_offset_ms = 1234;
        assert_eq!(s.position_ms(Utc::now()), 1234);
    }

    #[test]
    fn test_position_playing_is_elapsed_since_anchor() {
        let now = Utc::now();
        let mut s = state();
        s.is_playing = true;
        s.started_at = Some(now - Duration::milliseconds(7500));
        assert_eq!(s.position_ms(now), 7500);
    }

    #[test]
    fn test_position_never_negative() {
        let now = Utc::now();
        let mut s = state();
        s.is_playing = true;
        // An anchor in the future can only come from clock skew; clamp it.
        s.started_at = Some(now + Duration::milliseconds(500));
        assert_eq!(s.position_ms(now), 0);
    }

    #[test]
    fn test_media_kind_round_trip() {
        for kind in MediaKind::ALL {
            assert_eq!(kind.as_str().parse::<MediaKind>().unwrap(), kind);
        }
        assert!("podcast".parse::<MediaKind>().is_err());
    }
}
