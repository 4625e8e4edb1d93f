//! State publisher
//!
//! The snapshot is a projection of controller state, rebuilt after every
//! input and published only when something observable changed. Observers
//! read it from a `watch` channel: intermediate values may be coalesced but
//! the latest one is always visible. Notifications go out on a `broadcast`
//! channel.

use crate::events::PlaybackEvent;
use crate::types::{LoopMode, PlaybackState, QueueEntry, Track};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Immutable view of the playback session
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    /// Bumped on every published change
    pub version: u64,

    pub state: PlaybackState,

    /// Play generation the snapshot was taken at
    pub generation: u64,

    pub current_track: Option<Arc<Track>>,
    pub current_index: Option<usize>,

    pub playing: bool,
    pub position: Duration,

    /// Backend duration when known, otherwise the track's hint
    pub duration: Option<Duration>,
    pub buffered: Duration,

    pub loop_mode: LoopMode,
    pub shuffle: bool,

    /// Volume (0-100)
    pub volume: u8,

    /// Queue in play order
    pub queue: Vec<QueueEntry>,

    /// Recently started tracks, most recent first
    pub history: Vec<Arc<Track>>,
}

impl PlaybackSnapshot {
    /// Snapshot of a session that has not loaded anything yet
    pub fn empty(loop_mode: LoopMode, volume: u8) -> Self {
        Self {
            version: 0,
            state: PlaybackState::Idle,
            generation: 0,
            current_track: None,
            current_index: None,
            playing: false,
            position: Duration::ZERO,
            duration: None,
            buffered: Duration::ZERO,
            loop_mode,
            shuffle: false,
            volume,
            queue: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Playback progress in `0.0..=1.0`, `None` without a known duration
    pub fn progress(&self) -> Option<f64> {
        let duration = self.duration.filter(|d| !d.is_zero())?;
        Some((self.position.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0))
    }
}

/// Owns the sending side of the snapshot and notification channels
#[derive(Debug)]
pub struct StatePublisher {
    snapshots: watch::Sender<PlaybackSnapshot>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl StatePublisher {
    pub fn new(initial: PlaybackSnapshot, event_buffer: usize) -> Self {
        let (snapshots, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self { snapshots, events }
    }

    /// Publish a snapshot if it differs from the current one
    ///
    /// The incoming `version` is ignored and replaced. Returns whether
    /// observers were notified.
    pub fn publish(&self, mut snapshot: PlaybackSnapshot) -> bool {
        self.snapshots.send_if_modified(move |current| {
            snapshot.version = current.version;
            if *current == snapshot {
                return false;
            }
            snapshot.version += 1;
            *current = snapshot;
            true
        })
    }

    /// Broadcast a notification
    ///
    /// Having no subscribers is not an error.
    pub fn notify(&self, event: PlaybackEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshots.subscribe()
    }

    /// Sender handed out so handles can create new event subscriptions
    pub(crate) fn event_sender(&self) -> broadcast::Sender<PlaybackEvent> {
        self.events.clone()
    }
}
