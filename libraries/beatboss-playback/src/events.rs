//! Playback notifications
//!
//! Discrete happenings observers may want to react to, as opposed to the
//! continuously updated snapshot. Emitted at key points:
//! - A track genuinely starts playing (once per play start, never per retry)
//! - A track is skipped because it could not be played
//! - Recovery from a dropped stream begins
//! - The queue runs out, or nothing in it can be played

use crate::types::{EntryId, Track};
use std::sync::Arc;

/// Why a track was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The catalog reports the track as unavailable
    NotFound,

    /// Resolution kept failing until the retry budget ran out
    TransportFailure,

    /// The backend could not open the resolved source
    BackendFailure,
}

/// Events emitted by the playback service
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// A track became current and started playing
    ///
    /// History and now-playing integrations hook in here.
    TrackStarted {
        entry_id: EntryId,
        track: Arc<Track>,
    },

    /// A track could not be played and the queue moved on
    TrackSkipped {
        track_id: String,
        reason: SkipReason,
    },

    /// Re-opening the current track after a stream failure
    Recovering {
        track_id: String,
        /// Recovery attempt within this play session, starting at 1
        attempt: u32,
    },

    /// Playback reached the end of the queue
    QueueExhausted,

    /// Every track in the queue failed to load
    NothingPlayable,
}
