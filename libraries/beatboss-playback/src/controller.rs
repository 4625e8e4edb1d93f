//! Playback session controller
//!
//! Synchronous state machine that owns the queue and every mutable playback
//! flag. It never performs I/O itself: inputs go in through [`handle`], and
//! the work to do comes out as [`Effect`]s collected until the owner calls
//! [`drain_effects`]. The service runs the effects and feeds their results
//! back as new inputs, so every mutation happens in one place, in arrival
//! order.
//!
//! ```text
//!           loadQueue / skip / jump
//!   Idle ───────────────────────────▶ Loading ──opened──▶ Playing ◀──▶ Paused
//!                                        │                  │  ▲
//!                                  failed│      dropped or  │  │ reopened
//!                                        ▼      cut short   ▼  │
//!                                  skip / Idle            Recovering
//! ```
//!
//! Every entry to `Loading` or `Recovering` bumps the play generation.
//! Results and backend reports carry the generation they were produced for;
//! anything older than the current generation is dropped unseen.
//!
//! [`handle`]: PlaybackController::handle
//! [`drain_effects`]: PlaybackController::drain_effects

use crate::backend::{BackendEvent, BackendStatus, ProcessingState, SourceTag};
use crate::error::{BackendError, ResolveError};
use crate::events::{PlaybackEvent, SkipReason};
use crate::history::History;
use crate::publisher::PlaybackSnapshot;
use crate::queue::{AfterRemoval, PreviousTarget, Queue};
use crate::types::{LoopMode, MediaUri, PlaybackConfig, PlaybackState, QueueEntry, Track};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Past this position a reported position of zero is treated as a glitch
const FLINCH_GUARD: Duration = Duration::from_secs(2);

/// User intents
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    LoadQueue {
        tracks: Vec<Arc<Track>>,
        start_index: usize,
    },
    SkipNext,
    SkipPrevious,
    TogglePlayPause,
    SeekTo(Duration),
    /// Fraction of the track duration, clamped to `0.0..=1.0`
    SeekToFraction(f64),
    SetLoopMode(LoopMode),
    CycleLoopMode,
    ToggleShuffle,
    InsertNext(Arc<Track>),
    Enqueue(Arc<Track>),
    RemoveAt(usize),
    JumpTo(usize),
    ClearQueue,
    Stop,
    /// Volume (0-100)
    SetVolume(u8),
}

/// Everything the controller reacts to
#[derive(Debug)]
pub enum Input {
    Command(Command),

    /// A resolution task finished
    Resolved {
        generation: u64,
        result: Result<MediaUri, ResolveError>,
    },

    /// The backend finished opening a source and was told to play
    SourceOpened {
        generation: u64,
        result: Result<(), BackendError>,
    },

    /// A scheduled retry delay elapsed
    RetryDue { generation: u64 },

    /// Pushed by the backend
    Backend(BackendEvent),

    /// Polled from the backend
    Tick(BackendStatus),
}

/// Backend operations, executed in the order they were issued
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOp {
    /// Open a source and start playing it
    Open {
        tag: SourceTag,
        uri: MediaUri,
        start_at: Option<Duration>,
    },
    Play,
    Pause,
    Stop,
    Seek(Duration),
    /// Volume in `0.0..=1.0`
    SetVolume(f32),
}

/// Work requested by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Resolve a playable source; answer with [`Input::Resolved`]
    Resolve { generation: u64, track: Arc<Track> },

    /// Drive the backend; `Open` is answered with [`Input::SourceOpened`]
    Backend(BackendOp),

    /// Wait, then answer with [`Input::RetryDue`]
    ScheduleRetry { generation: u64, delay: Duration },

    /// Notify observers
    Emit(PlaybackEvent),
}

/// Playback session controller
#[derive(Debug)]
pub struct PlaybackController {
    config: PlaybackConfig,
    state: PlaybackState,
    queue: Queue,
    history: History,
    loop_mode: LoopMode,
    shuffle: bool,
    volume: u8,

    // Play generation, see module docs
    generation: u64,

    // Last accepted backend report for the current source
    position: Duration,
    buffered: Duration,
    backend_duration: Option<Duration>,

    // A seek was issued and no position has been accepted since
    seek_pending: bool,

    // Loop-one replay issued; ignore "completed" until the backend catches up
    replaying: bool,

    // Per play session
    announced: bool,
    resume_at: Option<Duration>,
    resume_paused: bool,
    recoveries: u32,
    open_attempts: u32,

    // Backend error reported for the source being opened
    open_error: Option<String>,

    // Tracks that failed to load in a row
    consecutive_failures: usize,

    pending_effects: Vec<Effect>,
}

impl PlaybackController {
    /// Create a controller; the initial volume is queued as the first effect
    pub fn new(config: PlaybackConfig) -> Self {
        let volume = config.volume.min(100);
        let mut controller = Self {
            state: PlaybackState::Idle,
            queue: Queue::new(),
            history: History::new(config.history_size),
            loop_mode: config.loop_mode,
            shuffle: false,
            volume,
            generation: 0,
            position: Duration::ZERO,
            buffered: Duration::ZERO,
            backend_duration: None,
            seek_pending: false,
            replaying: false,
            announced: false,
            resume_at: None,
            resume_paused: false,
            recoveries: 0,
            open_attempts: 0,
            open_error: None,
            consecutive_failures: 0,
            pending_effects: Vec::new(),
            config,
        };
        controller.push_backend(BackendOp::SetVolume(volume_scalar(volume)));
        controller
    }

    /// Feed one input through the state machine
    pub fn handle(&mut self, input: Input) {
        match input {
            Input::Command(command) => self.handle_command(command),
            Input::Resolved { generation, result } => self.on_resolved(generation, result),
            Input::SourceOpened { generation, result } => {
                self.on_source_opened(generation, result);
            }
            Input::RetryDue { generation } => self.on_retry_due(generation),
            Input::Backend(BackendEvent::Status(status)) | Input::Tick(status) => {
                self.on_status(status);
            }
            Input::Backend(BackendEvent::Error { tag, message }) => {
                self.on_backend_error(tag, &message);
            }
        }
    }

    /// Shorthand for `handle(Input::Command(..))`
    pub fn command(&mut self, command: Command) {
        self.handle(Input::Command(command));
    }

    /// Take all effects produced since the last drain
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.pending_effects)
    }

    pub fn has_pending_effects(&self) -> bool {
        !self.pending_effects.is_empty()
    }

    // ===== Commands =====

    fn handle_command(&mut self, command: Command) {
        // Any user intervention gives every track a fresh chance
        self.consecutive_failures = 0;

        match command {
            Command::LoadQueue {
                tracks,
                start_index,
            } => self.load_queue(tracks, start_index),
            Command::SkipNext => self.skip_next(),
            Command::SkipPrevious => self.skip_previous(),
            Command::TogglePlayPause => self.toggle_play_pause(),
            Command::SeekTo(position) => self.seek_to(position),
            Command::SeekToFraction(fraction) => self.seek_to_fraction(fraction),
            Command::SetLoopMode(mode) => self.loop_mode = mode,
            Command::CycleLoopMode => self.loop_mode = self.loop_mode.cycle(),
            Command::ToggleShuffle => self.toggle_shuffle(),
            Command::InsertNext(track) => {
                self.queue.insert_after_current(track);
            }
            Command::Enqueue(track) => {
                self.queue.append(track);
            }
            Command::RemoveAt(index) => self.remove_at(index),
            Command::JumpTo(index) => self.jump_to(index),
            Command::ClearQueue => {
                // Nothing left to restore; the next queue starts unshuffled
                self.queue.clear();
                self.shuffle = false;
                self.halt(PlaybackState::Stopped);
            }
            Command::Stop => self.halt(PlaybackState::Stopped),
            Command::SetVolume(volume) => {
                self.volume = volume.min(100);
                self.push_backend(BackendOp::SetVolume(volume_scalar(self.volume)));
            }
        }
    }

    fn load_queue(&mut self, tracks: Vec<Arc<Track>>, start_index: usize) {
        if self.queue.set_queue(tracks, start_index).is_none() {
            info!("Loaded empty queue");
            self.halt(PlaybackState::Idle);
            return;
        }

        if self.shuffle {
            self.queue.shuffle(self.config.shuffle_strategy);
        }

        info!(tracks = self.queue.len(), start_index, "Queue loaded");
        if let Some(index) = self.queue.current_index() {
            self.begin_load(index);
        }
    }

    fn skip_next(&mut self) {
        if self.queue.is_empty() {
            debug!("Skip on empty queue");
            return;
        }
        match self.queue.advance(self.loop_mode.for_manual_skip()) {
            Some(next) => self.begin_load(next),
            None => self.exhausted(),
        }
    }

    fn skip_previous(&mut self) {
        let elapsed = if self.has_source() {
            self.position
        } else {
            Duration::ZERO
        };
        let target = self.queue.previous(
            elapsed,
            self.config.previous_restart_threshold(),
            self.loop_mode,
        );

        match target {
            None => debug!("Previous on empty queue"),
            Some(PreviousTarget::RestartCurrent) if self.has_source() => {
                self.seek_to(Duration::ZERO);
            }
            Some(PreviousTarget::RestartCurrent) => {
                if let Some(index) = self.queue.current_index() {
                    self.begin_load(index);
                }
            }
            Some(PreviousTarget::Index(index)) => self.begin_load(index),
        }
    }

    fn toggle_play_pause(&mut self) {
        match self.state {
            PlaybackState::Playing => {
                self.push_backend(BackendOp::Pause);
                self.state = PlaybackState::Paused;
            }
            PlaybackState::Paused => {
                self.push_backend(BackendOp::Play);
                self.state = PlaybackState::Playing;
            }
            PlaybackState::Idle | PlaybackState::Stopped => {
                if !self.queue.is_empty() {
                    self.begin_load(self.queue.current_index().unwrap_or(0));
                }
            }
            PlaybackState::Loading | PlaybackState::Recovering => {
                debug!(state = ?self.state, "Play/pause ignored while opening a source");
            }
        }
    }

    fn seek_to(&mut self, position: Duration) {
        if !self.has_source() {
            debug!(state = ?self.state, "Seek ignored without an open source");
            return;
        }

        let target = match self.expected_duration() {
            Some(duration) => position.min(duration),
            None => position,
        };
        self.position = target;
        self.seek_pending = true;
        self.push_backend(BackendOp::Seek(target));
    }

    fn seek_to_fraction(&mut self, fraction: f64) {
        if !fraction.is_finite() {
            return;
        }
        if let Some(duration) = self.expected_duration() {
            self.seek_to(duration.mul_f64(fraction.clamp(0.0, 1.0)));
        }
    }

    fn toggle_shuffle(&mut self) {
        if self.shuffle {
            self.queue.unshuffle();
        } else {
            self.queue.shuffle(self.config.shuffle_strategy);
        }
        self.shuffle = !self.shuffle;
        debug!(shuffle = self.shuffle, "Shuffle toggled");
    }

    fn remove_at(&mut self, index: usize) {
        let Some(removed) = self.queue.remove_at(index) else {
            warn!(index, len = self.queue.len(), "Remove index out of range");
            return;
        };

        if !removed.was_current || !self.state.is_active() {
            return;
        }

        info!(track_id = %removed.entry.track.id, "Current track removed");
        let policy = if self.loop_mode == LoopMode::All {
            AfterRemoval::Wrap
        } else {
            AfterRemoval::StopAtEnd
        };
        match self.queue.successor_after_removal(removed.index, policy) {
            Some(next) => self.begin_load(next),
            None => self.halt(PlaybackState::Stopped),
        }
    }

    fn jump_to(&mut self, index: usize) {
        if index < self.queue.len() {
            self.begin_load(index);
        } else {
            warn!(index, len = self.queue.len(), "Jump index out of range");
        }
    }

    // ===== Transitions =====

    fn begin_load(&mut self, index: usize) {
        if !self.queue.set_current(index) {
            return;
        }
        let Some(track) = self.current_track() else {
            return;
        };

        if self.state.is_active() {
            self.push_backend(BackendOp::Stop);
        }

        self.generation += 1;
        self.state = PlaybackState::Loading;
        self.reset_session();

        info!(track_id = %track.id, index, generation = self.generation, "Loading track");
        self.pending_effects.push(Effect::Resolve {
            generation: self.generation,
            track,
        });
    }

    /// Reopen the current track at the last known position
    ///
    /// `delayed` waits `retry_delay` before resolving again.
    fn recover(&mut self, delayed: bool) {
        let Some(track) = self.current_track() else {
            return;
        };

        if self.recoveries >= self.config.max_retries {
            warn!(track_id = %track.id, recoveries = self.recoveries, "Recovery budget exhausted, moving on");
            self.finish_track(self.loop_mode.for_manual_skip());
            return;
        }

        self.recoveries += 1;
        self.generation += 1;
        self.resume_paused = self.state == PlaybackState::Paused;
        self.state = PlaybackState::Recovering;
        self.resume_at = Some(self.position);
        self.open_attempts = 0;
        self.open_error = None;
        self.seek_pending = false;
        self.replaying = false;

        warn!(
            track_id = %track.id,
            attempt = self.recoveries,
            generation = self.generation,
            position_ms = self.position.as_millis() as u64,
            "Recovering playback"
        );
        self.emit(PlaybackEvent::Recovering {
            track_id: track.id.clone(),
            attempt: self.recoveries,
        });

        if delayed {
            self.pending_effects.push(Effect::ScheduleRetry {
                generation: self.generation,
                delay: self.config.retry_delay(),
            });
        } else {
            self.pending_effects.push(Effect::Resolve {
                generation: self.generation,
                track,
            });
        }
    }

    /// Completion policy
    ///
    /// `One` replays in place. `Off` consumes the finished entry and clamps
    /// to the end. `All` moves the finished entry to the back so the queue
    /// keeps its length.
    fn finish_track(&mut self, loop_mode: LoopMode) {
        let Some(index) = self.queue.current_index() else {
            self.halt(PlaybackState::Stopped);
            return;
        };

        let next = match loop_mode {
            LoopMode::One => {
                self.replay_current();
                return;
            }
            LoopMode::All => self.queue.rotate_current_to_end(),
            LoopMode::Off => {
                self.queue.remove_at(index);
                self.queue
                    .successor_after_removal(index, AfterRemoval::Clamp)
            }
        };

        match next {
            Some(next) => self.begin_load(next),
            None => self.exhausted(),
        }
    }

    fn replay_current(&mut self) {
        debug!(generation = self.generation, "Replaying current track");
        self.position = Duration::ZERO;
        self.seek_pending = true;
        self.replaying = true;
        self.state = PlaybackState::Playing;
        self.push_backend(BackendOp::Seek(Duration::ZERO));
        self.push_backend(BackendOp::Play);
        self.announce();
    }

    /// The current track could not be opened; move past it
    fn skip_unplayable(&mut self, reason: SkipReason) {
        let Some(track) = self.current_track() else {
            return;
        };
        self.emit(PlaybackEvent::TrackSkipped {
            track_id: track.id.clone(),
            reason,
        });

        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.queue.len() {
            warn!(failures = self.consecutive_failures, "Nothing in the queue is playable");
            self.halt(PlaybackState::Idle);
            self.emit(PlaybackEvent::NothingPlayable);
            return;
        }

        match self.queue.advance(self.loop_mode.for_manual_skip()) {
            Some(next) => self.begin_load(next),
            None => self.exhausted(),
        }
    }

    fn exhausted(&mut self) {
        info!("Queue exhausted");
        self.halt(PlaybackState::Stopped);
        self.emit(PlaybackEvent::QueueExhausted);
    }

    /// Leave playback: backend stopped, no current entry
    fn halt(&mut self, state: PlaybackState) {
        if self.state.is_active() {
            self.push_backend(BackendOp::Stop);
        }
        self.generation += 1;
        self.state = state;
        self.queue.clear_current();
        self.reset_session();
        debug!(state = ?state, generation = self.generation, "Playback halted");
    }

    fn announce(&mut self) {
        let Some(entry) = self.queue.current_entry() else {
            return;
        };
        let entry_id = entry.entry_id;
        let track = Arc::clone(&entry.track);

        self.announced = true;
        info!(track_id = %track.id, title = %track.title, artist = %track.artist, "Track started");
        self.history.record(Arc::clone(&track));
        self.emit(PlaybackEvent::TrackStarted { entry_id, track });
    }

    // ===== Results and backend reports =====

    fn on_resolved(&mut self, generation: u64, result: Result<MediaUri, ResolveError>) {
        if !self.is_current(generation) || !self.is_opening() {
            return;
        }

        match result {
            Ok(uri) => {
                debug!(generation, uri = %uri, "Source resolved");
                self.push_backend(BackendOp::Open {
                    tag: SourceTag(generation),
                    uri,
                    start_at: self.resume_at,
                });
            }
            Err(err) => {
                let reason = match err {
                    ResolveError::NotFound { .. } => SkipReason::NotFound,
                    ResolveError::TransportFailure { .. } => SkipReason::TransportFailure,
                };
                self.opening_failed(reason, &err.to_string());
            }
        }
    }

    fn on_source_opened(&mut self, generation: u64, result: Result<(), BackendError>) {
        if !self.is_current(generation) || !self.is_opening() {
            return;
        }

        // An error pushed while the source was opening outranks the open result
        let result = match self.open_error.take() {
            Some(message) => Err(BackendError::Transport(message)),
            None => result,
        };

        match result {
            Ok(()) => self.source_playing(),
            Err(err) if self.open_attempts < self.config.max_retries => {
                self.open_attempts += 1;
                warn!(generation, attempt = self.open_attempts, error = %err, "Backend failed to open source, retrying");
                self.pending_effects.push(Effect::ScheduleRetry {
                    generation,
                    delay: self.config.retry_delay(),
                });
            }
            Err(err) => self.opening_failed(SkipReason::BackendFailure, &err.to_string()),
        }
    }

    fn on_retry_due(&mut self, generation: u64) {
        if !self.is_current(generation) || !self.is_opening() {
            return;
        }
        if let Some(track) = self.current_track() {
            debug!(track_id = %track.id, generation, "Retrying resolution");
            self.pending_effects
                .push(Effect::Resolve { generation, track });
        }
    }

    fn opening_failed(&mut self, reason: SkipReason, message: &str) {
        match self.state {
            PlaybackState::Loading => {
                warn!(?reason, error = message, "Track could not be loaded, skipping");
                self.skip_unplayable(reason);
            }
            PlaybackState::Recovering => {
                warn!(?reason, error = message, "Recovery failed, treating as completion");
                self.finish_track(self.loop_mode.for_manual_skip());
            }
            _ => {}
        }
    }

    fn source_playing(&mut self) {
        let recovered = self.state == PlaybackState::Recovering;
        self.state = PlaybackState::Playing;
        self.consecutive_failures = 0;
        if let Some(at) = self.resume_at.take() {
            self.position = at;
        }

        if recovered {
            info!(generation = self.generation, position_ms = self.position.as_millis() as u64, "Playback recovered");
        }
        if self.resume_paused {
            self.resume_paused = false;
            self.push_backend(BackendOp::Pause);
            self.state = PlaybackState::Paused;
        }
        if !self.announced {
            self.announce();
        }
    }

    fn on_backend_error(&mut self, tag: SourceTag, message: &str) {
        if !self.is_current(tag.0) {
            return;
        }
        if self.has_source() {
            warn!(generation = tag.0, error = message, "Backend transport error");
            self.recover(true);
        } else if self.is_opening() {
            warn!(generation = tag.0, error = message, "Backend error while opening source");
            self.open_error = Some(message.to_string());
        } else {
            debug!(state = ?self.state, error = message, "Backend error while not playing");
        }
    }

    fn on_status(&mut self, status: BackendStatus) {
        if !self.is_current(status.tag.0) || !self.has_source() {
            return;
        }

        if let Some(duration) = status.duration.filter(|d| !d.is_zero()) {
            self.backend_duration = Some(duration);
        }

        // Completed reports from before the replay seek landed
        if self.replaying && status.processing == ProcessingState::Completed {
            return;
        }

        self.buffered = status.buffered;
        self.accept_position(status.position);

        if status.processing != ProcessingState::Completed {
            self.replaying = false;
            return;
        }
        if self.state == PlaybackState::Playing {
            self.on_completed();
        }
    }

    fn accept_position(&mut self, position: Duration) {
        if position.is_zero() && self.position > FLINCH_GUARD && !self.seek_pending {
            debug!(last_ms = self.position.as_millis() as u64, "Ignoring zero position report");
            return;
        }
        self.position = position;
        self.seek_pending = false;
    }

    fn on_completed(&mut self) {
        if let Some(expected) = self.expected_duration() {
            if self.position + self.config.completion_tolerance() < expected {
                warn!(
                    position_ms = self.position.as_millis() as u64,
                    expected_ms = expected.as_millis() as u64,
                    "Stream ended early"
                );
                self.recover(false);
                return;
            }
        }
        self.finish_track(self.loop_mode);
    }

    // ===== Helpers =====

    fn is_current(&self, generation: u64) -> bool {
        if generation == self.generation {
            true
        } else {
            debug!(generation, current = self.generation, "Dropping stale input");
            false
        }
    }

    fn is_opening(&self) -> bool {
        matches!(
            self.state,
            PlaybackState::Loading | PlaybackState::Recovering
        )
    }

    /// A source is open and reporting
    fn has_source(&self) -> bool {
        matches!(self.state, PlaybackState::Playing | PlaybackState::Paused)
    }

    fn reset_session(&mut self) {
        self.position = Duration::ZERO;
        self.buffered = Duration::ZERO;
        self.backend_duration = None;
        self.seek_pending = false;
        self.replaying = false;
        self.announced = false;
        self.resume_at = None;
        self.resume_paused = false;
        self.recoveries = 0;
        self.open_attempts = 0;
        self.open_error = None;
    }

    fn current_track(&self) -> Option<Arc<Track>> {
        self.queue.current_entry().map(|e| Arc::clone(&e.track))
    }

    fn push_backend(&mut self, op: BackendOp) {
        self.pending_effects.push(Effect::Backend(op));
    }

    fn emit(&mut self, event: PlaybackEvent) {
        self.pending_effects.push(Effect::Emit(event));
    }

    // ===== State Queries =====

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffle
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn current_entry(&self) -> Option<&QueueEntry> {
        self.queue.current_entry()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Backend duration when known, otherwise the track's hint
    pub fn expected_duration(&self) -> Option<Duration> {
        self.backend_duration
            .or_else(|| self.queue.current_entry().and_then(|e| e.track.duration))
    }

    /// Project the current state
    ///
    /// The version is left at zero; the publisher assigns it.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            version: 0,
            state: self.state,
            generation: self.generation,
            current_track: self.current_track(),
            current_index: self.queue.current_index(),
            playing: self.state == PlaybackState::Playing,
            position: self.position,
            duration: self.expected_duration(),
            buffered: self.buffered,
            loop_mode: self.loop_mode,
            shuffle: self.shuffle,
            volume: self.volume,
            queue: self.queue.entries().to_vec(),
            history: self.history.to_vec(),
        }
    }
}

fn volume_scalar(volume: u8) -> f32 {
    f32::from(volume.min(100)) / 100.0
}
