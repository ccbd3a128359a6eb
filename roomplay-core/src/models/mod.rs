pub mod id;
pub mod playback;

pub use id::{RoomId, UserId};
pub use playback::{MediaDescriptor, MediaKind, PlaybackSnapshot, PlaybackState};
