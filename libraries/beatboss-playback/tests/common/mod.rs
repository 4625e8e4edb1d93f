//! Shared test infrastructure
//!
//! - `Harness`: drives a `PlaybackController` synchronously, answering its
//!   effects the way the service would
//! - `FakeBackend` / `ScriptedResolver`: collaborators for service tests

#![allow(dead_code)]

use async_trait::async_trait;
use beatboss_playback::error::BackendError;
use beatboss_playback::{
    BackendEvent, BackendOp, BackendStatus, Command, Effect, Input, MediaBackend, MediaUri,
    PlaybackConfig, PlaybackController, PlaybackEvent, ProcessingState, ResolveError, SourceTag,
    Track, TrackResolver,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::mpsc;

pub const TRACK_LENGTH: Duration = Duration::from_secs(200);

static TRACING: Once = Once::new();

/// Route library logs to the test writer (RUST_LOG to filter)
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn track(id: &str) -> Track {
    Track::new(id, format!("Track {}", id.to_uppercase()), "Test Artist").with_duration(TRACK_LENGTH)
}

pub fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter().map(|id| track(id)).collect()
}

pub fn status(tag: u64, position: Duration, processing: ProcessingState) -> BackendStatus {
    BackendStatus {
        tag: SourceTag(tag),
        position,
        buffered: position,
        duration: Some(TRACK_LENGTH),
        playing: processing != ProcessingState::Completed,
        processing,
    }
}

// ============================================================================
// Synchronous controller harness
// ============================================================================

pub struct Harness {
    pub controller: PlaybackController,
    pub events: Vec<PlaybackEvent>,
    pub ops: Vec<BackendOp>,
    unavailable: HashSet<String>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(PlaybackConfig::default())
    }

    pub fn with_config(config: PlaybackConfig) -> Self {
        let mut harness = Self {
            controller: PlaybackController::new(config),
            events: Vec::new(),
            ops: Vec::new(),
            unavailable: HashSet::new(),
        };
        harness.settle();
        harness.clear_log();
        harness
    }

    /// Resolution of `track_id` reports NotFound from now on
    pub fn make_unavailable(&mut self, track_id: &str) {
        self.unavailable.insert(track_id.to_string());
    }

    pub fn load(&mut self, ids: &[&str], start_index: usize) {
        self.command(Command::LoadQueue {
            tracks: tracks(ids).into_iter().map(Arc::new).collect(),
            start_index,
        });
    }

    pub fn command(&mut self, command: Command) {
        self.controller.command(command);
        self.settle();
    }

    pub fn input(&mut self, input: Input) {
        self.controller.handle(input);
        self.settle();
    }

    /// Answer effects until the controller has nothing left to ask for
    pub fn settle(&mut self) {
        loop {
            let effects = self.controller.drain_effects();
            if effects.is_empty() {
                return;
            }
            for effect in effects {
                self.answer(effect);
            }
        }
    }

    /// Apply effects without answering them
    pub fn take_effects(&mut self) -> Vec<Effect> {
        self.controller.drain_effects()
    }

    fn answer(&mut self, effect: Effect) {
        match effect {
            Effect::Resolve { generation, track } => {
                let result = if self.unavailable.contains(&track.id) {
                    Err(ResolveError::NotFound {
                        track_id: track.id.clone(),
                    })
                } else {
                    Ok(MediaUri::Remote(format!("https://cdn.test/{}", track.id)))
                };
                self.controller
                    .handle(Input::Resolved { generation, result });
            }
            Effect::Backend(op) => {
                if let BackendOp::Open { tag, .. } = &op {
                    let generation = tag.0;
                    self.controller.handle(Input::SourceOpened {
                        generation,
                        result: Ok(()),
                    });
                }
                self.ops.push(op);
            }
            Effect::ScheduleRetry { generation, .. } => {
                self.controller.handle(Input::RetryDue { generation });
            }
            Effect::Emit(event) => self.events.push(event),
        }
    }

    /// Backend reports the current track played to its end
    pub fn complete(&mut self) {
        self.report(TRACK_LENGTH, ProcessingState::Completed);
    }

    /// Backend reports end of stream at `position`
    pub fn complete_at(&mut self, position: Duration) {
        self.report(position, ProcessingState::Completed);
    }

    pub fn report(&mut self, position: Duration, processing: ProcessingState) {
        let generation = self.controller.generation();
        self.input(Input::Tick(status(generation, position, processing)));
    }

    pub fn backend_error(&mut self, message: &str) {
        let generation = self.controller.generation();
        self.input(Input::Backend(BackendEvent::Error {
            tag: SourceTag(generation),
            message: message.to_string(),
        }));
    }

    pub fn clear_log(&mut self) {
        self.events.clear();
        self.ops.clear();
    }

    pub fn queue_ids(&self) -> Vec<String> {
        self.controller
            .queue()
            .entries()
            .iter()
            .map(|e| e.track.id.clone())
            .collect()
    }

    pub fn current_id(&self) -> Option<String> {
        self.controller.current_entry().map(|e| e.track.id.clone())
    }

    pub fn started_ids(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PlaybackEvent::TrackStarted { track, .. } => Some(track.id.clone()),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// Service collaborators
// ============================================================================

#[derive(Default)]
struct BackendState {
    calls: Vec<String>,
    status: Option<BackendStatus>,
}

/// In-memory backend that records calls and pushes scripted reports
pub struct FakeBackend {
    state: Mutex<BackendState>,
    events: mpsc::UnboundedSender<BackendEvent>,
}

impl FakeBackend {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<BackendEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let backend = Arc::new(Self {
            state: Mutex::new(BackendState::default()),
            events,
        });
        (backend, rx)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Tag of the source opened last
    pub fn current_tag(&self) -> Option<SourceTag> {
        self.state.lock().unwrap().status.as_ref().map(|s| s.tag)
    }

    /// Push a status report for the open source
    pub fn push_status(&self, position: Duration, processing: ProcessingState) {
        let Some(tag) = self.current_tag() else {
            return;
        };
        let report = status(tag.0, position, processing);
        self.state.lock().unwrap().status = Some(report.clone());
        let _ = self.events.send(BackendEvent::Status(report));
    }

    /// Push a transport error for the open source
    pub fn push_error(&self, message: &str) {
        let Some(tag) = self.current_tag() else {
            return;
        };
        let _ = self.events.send(BackendEvent::Error {
            tag,
            message: message.to_string(),
        });
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    async fn set_source(
        &self,
        uri: &MediaUri,
        start_at: Option<Duration>,
        tag: SourceTag,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!(
            "open {} @{}",
            uri,
            start_at.unwrap_or_default().as_secs()
        ));
        let mut initial = BackendStatus::initial(tag);
        initial.position = start_at.unwrap_or_default();
        state.status = Some(initial);
        Ok(())
    }

    async fn play(&self) -> Result<(), BackendError> {
        self.record("play".to_string());
        Ok(())
    }

    async fn pause(&self) -> Result<(), BackendError> {
        self.record("pause".to_string());
        Ok(())
    }

    async fn stop(&self) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("stop".to_string());
        state.status = None;
        Ok(())
    }

    async fn seek(&self, position: Duration) -> Result<(), BackendError> {
        self.record(format!("seek {}", position.as_secs()));
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<(), BackendError> {
        self.record(format!("volume {:.2}", volume));
        Ok(())
    }

    async fn status(&self) -> Option<BackendStatus> {
        self.state.lock().unwrap().status.clone()
    }
}

/// Resolver with per-track latency and failures
#[derive(Default)]
pub struct ScriptedResolver {
    delays: HashMap<String, Duration>,
    unavailable: HashSet<String>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, track_id: &str, delay: Duration) -> Self {
        self.delays.insert(track_id.to_string(), delay);
        self
    }

    pub fn with_unavailable(mut self, track_id: &str) -> Self {
        self.unavailable.insert(track_id.to_string());
        self
    }
}

#[async_trait]
impl TrackResolver for ScriptedResolver {
    async fn resolve(&self, track: &Track) -> Result<MediaUri, ResolveError> {
        if let Some(delay) = self.delays.get(&track.id) {
            tokio::time::sleep(*delay).await;
        }
        if self.unavailable.contains(&track.id) {
            return Err(ResolveError::NotFound {
                track_id: track.id.clone(),
            });
        }
        Ok(MediaUri::Remote(format!("https://cdn.test/{}", track.id)))
    }
}
