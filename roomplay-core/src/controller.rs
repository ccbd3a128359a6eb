//! Pure playback state transitions
//!
//! Every transport command goes through exactly one of these functions; the
//! service layer owns locking, persistence and broadcasting. Each function
//! takes the current state plus the server clock reading and returns a new
//! state or a typed error, never mutating its input. Both control entry
//! points (HTTP and the WebSocket channel) route here so the two surfaces
//! cannot diverge.

use chrono::{DateTime, Duration, Utc};

use crate::{
    models::{MediaDescriptor, PlaybackState, UserId},
    Error, Result,
};

/// Clamp an externally supplied offset to non-negative.
///
/// Client-measured offsets are noisy; lenient normalization here is
/// deliberate, unlike the strict state-machine preconditions below.
#[must_use]
pub fn clamp_offset_ms(offset_ms: i64) -> i64 {
    offset_ms.max(0)
}

/// Verify the caller may issue transport commands for this state.
///
/// The first `play` on an empty state establishes the controlling user; every
/// later transition requires the caller to match it.
fn check_host(state: &PlaybackState, caller: &UserId) -> Result<()> {
    match &state.controlling_user_id {
        Some(host) if host != caller => Err(Error::NotAuthorized(format!(
            "User {caller} is not the controlling host of room {}",
            state.room_id
        ))),
        _ => Ok(()),
    }
}

/// Start playback from the beginning of `media`.
///
/// Supplying no descriptor replays the already-loaded media from position 0;
/// if none is loaded either, the command fails with `NoMediaLoaded`.
pub fn play(
    state: &PlaybackState,
    media: Option<MediaDescriptor>,
    caller: &UserId,
    now: DateTime<Utc>,
) -> Result<PlaybackState> {
    check_host(state, caller)?;

    let media = match media.or_else(|| state.media.clone()) {
        Some(m) => m,
        None => return Err(Error::NoMediaLoaded),
    };

    let mut next = state.clone();
    next.media = Some(media);
    next.is_playing = true;
    next.started_at = Some(now);
    next.paused_offset_ms = 0;
    next.controlling_user_id = Some(caller.clone());
    next.updated_at = now;
    Ok(next)
}

/// Pause at the offset the host observed.
pub fn pause(
    state: &PlaybackState,
    observed_offset_ms: i64,
    caller: &UserId,
    now: DateTime<Utc>,
) -> Result<PlaybackState> {
    check_host(state, caller)?;

    if !state.is_playing {
        return Err(Error::NotPlaying);
    }

    let mut next = state.clone();
    next.is_playing = false;
    next.started_at = None;
    next.paused_offset_ms = clamp_offset_ms(observed_offset_ms);
    next.updated_at = now;
    Ok(next)
}

/// Resume from the paused offset.
///
/// Rewinds the wall-clock anchor by the carried offset so `now - started_at`
/// keeps yielding elapsed-track time (continuity law).
pub fn resume(state: &PlaybackState, caller: &UserId, now: DateTime<Utc>) -> Result<PlaybackState> {
    check_host(state, caller)?;

    if state.media.is_none() {
        return Err(Error::NoMediaLoaded);
    }
    if state.is_playing {
        return Err(Error::AlreadyPlaying);
    }

    let mut next = state.clone();
    next.is_playing = true;
    next.started_at = Some(now - Duration::milliseconds(state.paused_offset_ms));
    next.paused_offset_ms = 0;
    next.updated_at = now;
    Ok(next)
}

/// Jump to `target_offset_ms`, playing or paused.
pub fn seek(
    state: &PlaybackState,
    target_offset_ms: i64,
    caller: &UserId,
    now: DateTime<Utc>,
) -> Result<PlaybackState> {
    check_host(state, caller)?;

    if state.media.is_none() {
        return Err(Error::NoMediaLoaded);
    }

    let target = clamp_offset_ms(target_offset_ms);
    let mut next = state.clone();
    if next.is_playing {
        next.started_at = Some(now - Duration::milliseconds(target));
    } else {
        next.paused_offset_ms = target;
    }
    next.updated_at = now;
    Ok(next)
}

/// Host-issued stop: unload the media and zero the position.
pub fn stop(state: &PlaybackState, caller: &UserId, now: DateTime<Utc>) -> Result<PlaybackState> {
    check_host(state, caller)?;
    Ok(force_stop(state, now))
}

/// Unconditional stop, used for host disconnect and room deletion where no
/// authorization applies.
#[must_use]
pub fn force_stop(state: &PlaybackState, now: DateTime<Utc>) -> PlaybackState {
    let mut next = state.clone();
    next.media = None;
    next.is_playing = false;
    next.started_at = None;
    next.paused_offset_ms = 0;
    next.controlling_user_id = None;
    next.updated_at = now;
    next
}
