//! Playback service
//!
//! Runs the controller on a single task. Commands from handles, results from
//! background work, pushed backend events and the position poll all funnel
//! into one `select!` loop, so the controller sees them one at a time.
//!
//! Resolution and retry delays run as their own tasks and report back as
//! inputs. Backend operations go through a driver task that executes them
//! strictly in issue order.

use crate::backend::{BackendEvent, MediaBackend, SourceTag};
use crate::controller::{BackendOp, Command, Effect, Input, PlaybackController};
use crate::error::{BackendError, PlaybackError, Result};
use crate::events::PlaybackEvent;
use crate::publisher::{PlaybackSnapshot, StatePublisher};
use crate::source::TrackResolver;
use crate::types::{LoopMode, MediaUri, PlaybackConfig, Track};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Cloneable handle for issuing intents and observing state
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<PlaybackSnapshot>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl PlaybackHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| PlaybackError::ServiceClosed)
    }

    /// Replace the queue and start playing at `start_index` (clamped)
    pub fn load_queue(&self, tracks: Vec<Track>, start_index: usize) -> Result<()> {
        self.send(Command::LoadQueue {
            tracks: tracks.into_iter().map(Arc::new).collect(),
            start_index,
        })
    }

    pub fn skip_next(&self) -> Result<()> {
        self.send(Command::SkipNext)
    }

    pub fn skip_previous(&self) -> Result<()> {
        self.send(Command::SkipPrevious)
    }

    pub fn toggle_play_pause(&self) -> Result<()> {
        self.send(Command::TogglePlayPause)
    }

    pub fn seek_to(&self, position: Duration) -> Result<()> {
        self.send(Command::SeekTo(position))
    }

    /// Seek by fraction of the track duration
    pub fn seek_to_fraction(&self, fraction: f64) -> Result<()> {
        if !fraction.is_finite() {
            return Err(PlaybackError::InvalidOperation(format!(
                "seek fraction must be finite, got {}",
                fraction
            )));
        }
        self.send(Command::SeekToFraction(fraction))
    }

    pub fn set_loop_mode(&self, mode: LoopMode) -> Result<()> {
        self.send(Command::SetLoopMode(mode))
    }

    pub fn cycle_loop_mode(&self) -> Result<()> {
        self.send(Command::CycleLoopMode)
    }

    pub fn toggle_shuffle(&self) -> Result<()> {
        self.send(Command::ToggleShuffle)
    }

    /// Play `track` right after the current one
    pub fn insert_next(&self, track: Track) -> Result<()> {
        self.send(Command::InsertNext(Arc::new(track)))
    }

    /// Add `track` to the end of the queue
    pub fn enqueue(&self, track: Track) -> Result<()> {
        self.send(Command::Enqueue(Arc::new(track)))
    }

    /// Remove a queue entry
    ///
    /// The index is checked against the latest published snapshot.
    pub fn remove_at(&self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.send(Command::RemoveAt(index))
    }

    /// Start playing the queue entry at `index`
    pub fn jump_to(&self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.send(Command::JumpTo(index))
    }

    pub fn clear_queue(&self) -> Result<()> {
        self.send(Command::ClearQueue)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    /// Set volume (0-100, clamped)
    pub fn set_volume(&self, volume: u8) -> Result<()> {
        self.send(Command::SetVolume(volume))
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Snapshot stream; intermediate values may be skipped
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshots.clone()
    }

    /// Notification stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.snapshots.borrow().queue.len() {
            Ok(())
        } else {
            Err(PlaybackError::IndexOutOfBounds(index))
        }
    }
}

/// Owner of the controller and its collaborators
pub struct PlaybackService {
    controller: PlaybackController,
    resolver: Arc<dyn TrackResolver>,
    backend: Arc<dyn MediaBackend>,
    publisher: StatePublisher,

    commands: mpsc::UnboundedReceiver<Command>,
    backend_events: mpsc::UnboundedReceiver<BackendEvent>,

    // Results of background work re-entering the loop
    inputs_tx: mpsc::UnboundedSender<Input>,
    inputs_rx: mpsc::UnboundedReceiver<Input>,

    backend_ops: mpsc::UnboundedSender<BackendOp>,

    // In-flight resolution, aborted once superseded
    resolving: Option<JoinHandle<()>>,

    poll_interval: Duration,
}

impl PlaybackService {
    /// Start the service on the current tokio runtime
    ///
    /// `backend_events` carries events pushed by `backend`. The service stops
    /// once every handle has been dropped.
    pub fn spawn(
        config: PlaybackConfig,
        resolver: Arc<dyn TrackResolver>,
        backend: Arc<dyn MediaBackend>,
        backend_events: mpsc::UnboundedReceiver<BackendEvent>,
    ) -> (PlaybackHandle, JoinHandle<()>) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();

        let poll_interval = config.position_poll_interval();
        let event_buffer = config.event_buffer;
        let controller = PlaybackController::new(config);
        let publisher = StatePublisher::new(controller.snapshot(), event_buffer);

        let handle = PlaybackHandle {
            commands: command_tx,
            snapshots: publisher.subscribe(),
            events: publisher.event_sender(),
        };

        let backend_ops = spawn_backend_driver(Arc::clone(&backend), inputs_tx.clone());

        let service = Self {
            controller,
            resolver,
            backend,
            publisher,
            commands,
            backend_events,
            inputs_tx,
            inputs_rx,
            backend_ops,
            resolving: None,
            poll_interval,
        };

        (handle, tokio::spawn(service.run()))
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Playback service started");
        self.flush();

        loop {
            let input = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => Input::Command(command),
                    None => break,
                },
                Some(input) = self.inputs_rx.recv() => input,
                Some(event) = self.backend_events.recv() => Input::Backend(event),
                _ = ticker.tick() => {
                    if !self.controller.state().is_active() {
                        continue;
                    }
                    match self.backend.status().await {
                        Some(status) => Input::Tick(status),
                        None => continue,
                    }
                }
            };

            self.controller.handle(input);
            self.flush();
        }

        if let Some(resolving) = self.resolving.take() {
            resolving.abort();
        }
        let _ = self.backend_ops.send(BackendOp::Stop);
        info!("Playback service stopped");
    }

    /// Execute pending effects, then publish
    ///
    /// Notifications go out after the snapshot so an observer reacting to
    /// one already sees the matching state.
    fn flush(&mut self) {
        let mut notifications = Vec::new();

        for effect in self.controller.drain_effects() {
            match effect {
                Effect::Resolve { generation, track } => self.spawn_resolve(generation, track),
                Effect::Backend(op) => {
                    if self.backend_ops.send(op).is_err() {
                        warn!("Backend driver has stopped");
                    }
                }
                Effect::ScheduleRetry { generation, delay } => {
                    let inputs = self.inputs_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = inputs.send(Input::RetryDue { generation });
                    });
                }
                Effect::Emit(event) => notifications.push(event),
            }
        }

        self.publisher.publish(self.controller.snapshot());
        for event in notifications {
            self.publisher.notify(event);
        }
    }

    fn spawn_resolve(&mut self, generation: u64, track: Arc<Track>) {
        if let Some(previous) = self.resolving.take() {
            previous.abort();
        }

        let resolver = Arc::clone(&self.resolver);
        let inputs = self.inputs_tx.clone();
        self.resolving = Some(tokio::spawn(async move {
            debug!(track_id = %track.id, generation, "Resolving source");
            let result = resolver.resolve(&track).await;
            let _ = inputs.send(Input::Resolved { generation, result });
        }));
    }
}

/// Spawn the task that executes backend operations in order
fn spawn_backend_driver(
    backend: Arc<dyn MediaBackend>,
    inputs: mpsc::UnboundedSender<Input>,
) -> mpsc::UnboundedSender<BackendOp> {
    let (ops_tx, mut ops_rx) = mpsc::unbounded_channel::<BackendOp>();

    tokio::spawn(async move {
        while let Some(op) = ops_rx.recv().await {
            match op {
                BackendOp::Open { tag, uri, start_at } => {
                    let result = open_source(backend.as_ref(), &uri, start_at, tag).await;
                    let _ = inputs.send(Input::SourceOpened {
                        generation: tag.0,
                        result,
                    });
                }
                op => {
                    if let Err(err) = run_op(backend.as_ref(), &op).await {
                        warn!(?op, error = %err, "Backend operation failed");
                    }
                }
            }
        }
    });

    ops_tx
}

async fn open_source(
    backend: &dyn MediaBackend,
    uri: &MediaUri,
    start_at: Option<Duration>,
    tag: SourceTag,
) -> std::result::Result<(), BackendError> {
    backend.set_source(uri, start_at, tag).await?;
    backend.play().await
}

async fn run_op(backend: &dyn MediaBackend, op: &BackendOp) -> std::result::Result<(), BackendError> {
    match op {
        BackendOp::Open { tag, uri, start_at } => open_source(backend, uri, *start_at, *tag).await,
        BackendOp::Play => backend.play().await,
        BackendOp::Pause => backend.pause().await,
        BackendOp::Stop => backend.stop().await,
        BackendOp::Seek(position) => backend.seek(*position).await,
        BackendOp::SetVolume(volume) => backend.set_volume(*volume).await,
    }
}
