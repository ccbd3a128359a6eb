pub mod events;
pub mod playback;
pub mod recovery;

pub use events::{PlaybackBroadcaster, PlaybackEvent};
pub use playback::PlaybackService;
pub use recovery::RecoveryLoader;
