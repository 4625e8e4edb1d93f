//! Simulated media engine
//!
//! Implements `MediaBackend` without producing any sound: a clock advances
//! the position of the open source while it plays, and the engine reports
//! `Completed` on its event stream when the source runs out. A source can be
//! scripted to cut out early on its first play, which is what a dropped
//! stream looks like to the controller.

use async_trait::async_trait;
use beatboss_playback::error::BackendError;
use beatboss_playback::{
    BackendEvent, BackendStatus, MediaBackend, MediaUri, ProcessingState, SourceTag,
};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info};

/// Buffer reported ahead of the play position for remote sources
const STREAM_BUFFER_AHEAD: Duration = Duration::from_secs(30);

/// What the engine knows about a source before opening it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedMedia {
    pub duration: Duration,

    /// Position where the stream cuts out when played from before it
    pub drop_at: Option<Duration>,
}

impl SimulatedMedia {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            drop_at: None,
        }
    }

    pub fn dropping_at(mut self, position: Duration) -> Self {
        self.drop_at = Some(position);
        self
    }
}

struct Deck {
    tag: SourceTag,
    local: bool,
    duration: Duration,
    end: Duration,
    position: Duration,
    playing: bool,
    processing: ProcessingState,
    updated: Instant,
}

impl Deck {
    /// Move the clock forward; true when the source just ran out
    fn advance(&mut self, now: Instant, speed: f64) -> bool {
        let elapsed = now.saturating_duration_since(self.updated);
        self.updated = now;

        if !self.playing || self.processing == ProcessingState::Completed {
            return false;
        }

        self.position += elapsed.mul_f64(speed);
        if self.position >= self.end {
            self.position = self.end;
            self.playing = false;
            self.processing = ProcessingState::Completed;
            return true;
        }
        false
    }

    fn status(&self) -> BackendStatus {
        let buffered = if self.local {
            self.duration
        } else {
            (self.position + STREAM_BUFFER_AHEAD).min(self.duration)
        };
        BackendStatus {
            tag: self.tag,
            position: self.position,
            buffered,
            duration: Some(self.duration),
            playing: self.playing,
            processing: self.processing,
        }
    }
}

#[derive(Default)]
struct Engine {
    deck: Option<Deck>,
    volume: f32,
}

pub struct SimulatedBackend {
    media: HashMap<String, SimulatedMedia>,
    fallback: Duration,
    speed: f64,
    engine: Mutex<Engine>,
    events: mpsc::UnboundedSender<BackendEvent>,
}

impl SimulatedBackend {
    /// Start the engine and its clock task
    ///
    /// `media` is keyed by the URI's display form. Unknown sources play for
    /// `fallback`. The clock stops once the backend or the event receiver
    /// is dropped.
    pub fn spawn(
        media: HashMap<String, SimulatedMedia>,
        fallback: Duration,
        speed: f64,
        tick: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<BackendEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let backend = Arc::new(Self {
            media,
            fallback,
            speed,
            engine: Mutex::new(Engine::default()),
            events,
        });

        tokio::spawn(run_clock(Arc::downgrade(&backend), tick));
        (backend, rx)
    }

    pub async fn volume(&self) -> f32 {
        self.engine.lock().await.volume
    }

    fn lookup(&self, uri: &MediaUri) -> SimulatedMedia {
        self.media
            .get(&uri.to_string())
            .copied()
            .unwrap_or_else(|| SimulatedMedia::new(self.fallback))
    }

    /// Advance the open source and report a completion if it ran out
    async fn tick(&self) -> bool {
        let mut engine = self.engine.lock().await;
        let Some(deck) = engine.deck.as_mut() else {
            return true;
        };
        if deck.advance(Instant::now(), self.speed) {
            debug!(tag = deck.tag.0, position = ?deck.position, "Simulated source ended");
            return self.events.send(BackendEvent::Status(deck.status())).is_ok();
        }
        true
    }

    async fn with_deck(&self, f: impl FnOnce(&mut Deck) + Send) {
        let mut engine = self.engine.lock().await;
        if let Some(deck) = engine.deck.as_mut() {
            deck.advance(Instant::now(), self.speed);
            f(deck);
        }
    }
}

async fn run_clock(backend: Weak<SimulatedBackend>, tick: Duration) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let Some(backend) = backend.upgrade() else {
            break;
        };
        if !backend.tick().await {
            break;
        }
    }
    debug!("Simulated engine clock stopped");
}

#[async_trait]
impl MediaBackend for SimulatedBackend {
    async fn set_source(
        &self,
        uri: &MediaUri,
        start_at: Option<Duration>,
        tag: SourceTag,
    ) -> Result<(), BackendError> {
        let media = self.lookup(uri);
        let position = start_at.unwrap_or_default().min(media.duration);
        let end = media
            .drop_at
            .filter(|drop| *drop > position)
            .map_or(media.duration, |drop| drop.min(media.duration));

        let deck = Deck {
            tag,
            local: uri.is_local(),
            duration: media.duration,
            end,
            position,
            playing: false,
            processing: ProcessingState::Ready,
            updated: Instant::now(),
        };
        let status = deck.status();

        info!(%uri, tag = tag.0, start_at = ?position, "Simulated source opened");
        self.engine.lock().await.deck = Some(deck);
        let _ = self.events.send(BackendEvent::Status(status));
        Ok(())
    }

    async fn play(&self) -> Result<(), BackendError> {
        self.with_deck(|deck| {
            if deck.processing != ProcessingState::Completed {
                deck.playing = true;
            }
        })
        .await;
        Ok(())
    }

    async fn pause(&self) -> Result<(), BackendError> {
        self.with_deck(|deck| deck.playing = false).await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), BackendError> {
        self.engine.lock().await.deck = None;
        Ok(())
    }

    async fn seek(&self, position: Duration) -> Result<(), BackendError> {
        self.with_deck(|deck| {
            deck.position = position.min(deck.duration);
            if deck.position >= deck.end {
                deck.end = deck.duration;
            }
            if deck.position < deck.end {
                deck.processing = ProcessingState::Ready;
            }
        })
        .await;
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<(), BackendError> {
        self.engine.lock().await.volume = volume.clamp(0.0, 1.0);
        Ok(())
    }

    async fn status(&self) -> Option<BackendStatus> {
        let mut engine = self.engine.lock().await;
        let deck = engine.deck.as_mut()?;
        deck.advance(Instant::now(), self.speed);
        Some(deck.status())
    }
}
