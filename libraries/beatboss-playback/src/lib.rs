//! Beatboss - Playback Session
//!
//! The part of the player that decides what plays, in what order, and what
//! to do when a stream misbehaves.
//!
//! This crate provides:
//! - Queue store with stable entry identity, shuffle (Random + Smart) and restore
//! - Loop modes (Off, All, One) with a consuming completion policy
//! - Source resolution: downloaded file first, remote stream with bounded retry
//! - Premature-completion and transport-error recovery at the last position
//! - Play history (configurable size)
//! - A versioned state snapshot plus discrete notifications for observers
//!
//! # Architecture
//!
//! `beatboss-playback` does no audio work and no HTTP itself. The audio
//! engine, catalog client and download registry are traits supplied by the
//! application.
//!
//! [`PlaybackController`] is a synchronous state machine: inputs in, effects
//! out. [`PlaybackService`] runs it on a single task and executes the effects,
//! which keeps every state change serialized.
//!
//! # Example: Driving the controller directly
//!
//! ```rust
//! use beatboss_playback::{Command, Effect, Input, MediaUri, PlaybackConfig, PlaybackController, PlaybackState, Track};
//! use std::sync::Arc;
//!
//! let mut controller = PlaybackController::new(PlaybackConfig::default());
//! controller.command(Command::LoadQueue {
//!     tracks: vec![Arc::new(Track::new("t1", "Song", "Artist"))],
//!     start_index: 0,
//! });
//!
//! for effect in controller.drain_effects() {
//!     if let Effect::Resolve { generation, .. } = effect {
//!         controller.handle(Input::Resolved {
//!             generation,
//!             result: Ok(MediaUri::Remote("https://cdn.example.com/t1".to_string())),
//!         });
//!     }
//! }
//! assert_eq!(controller.state(), PlaybackState::Loading);
//! ```
//!
//! # Example: Running the service
//!
//! ```rust,no_run
//! use beatboss_playback::{
//!     BackendStatus, MediaBackend, MediaUri, PlaybackConfig, PlaybackService, ResolveError,
//!     SourceTag, Track, TrackResolver,
//! };
//! use beatboss_playback::error::BackendError;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Streams;
//!
//! #[async_trait]
//! impl TrackResolver for Streams {
//!     async fn resolve(&self, track: &Track) -> Result<MediaUri, ResolveError> {
//!         Ok(MediaUri::Remote(format!("https://cdn.example.com/{}", track.id)))
//!     }
//! }
//!
//! struct Silent;
//!
//! #[async_trait]
//! impl MediaBackend for Silent {
//!     async fn set_source(&self, _: &MediaUri, _: Option<Duration>, _: SourceTag) -> Result<(), BackendError> { Ok(()) }
//!     async fn play(&self) -> Result<(), BackendError> { Ok(()) }
//!     async fn pause(&self) -> Result<(), BackendError> { Ok(()) }
//!     async fn stop(&self) -> Result<(), BackendError> { Ok(()) }
//!     async fn seek(&self, _: Duration) -> Result<(), BackendError> { Ok(()) }
//!     async fn set_volume(&self, _: f32) -> Result<(), BackendError> { Ok(()) }
//!     async fn status(&self) -> Option<BackendStatus> { None }
//! }
//!
//! # async fn run() -> beatboss_playback::Result<()> {
//! let (_events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
//! let (handle, _task) = PlaybackService::spawn(
//!     PlaybackConfig::default(),
//!     Arc::new(Streams),
//!     Arc::new(Silent),
//!     events_rx,
//! );
//!
//! handle.load_queue(vec![Track::new("t1", "Song", "Artist")], 0)?;
//! let mut snapshots = handle.subscribe();
//! snapshots.changed().await.ok();
//! println!("{:?}", snapshots.borrow().state);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod controller;
pub mod error;
pub mod events;
mod history;
pub mod publisher;
pub mod queue;
mod service;
mod shuffle;
pub mod source;
pub mod types;

// Public exports
pub use backend::{BackendEvent, BackendStatus, MediaBackend, ProcessingState, SourceTag};
pub use controller::{BackendOp, Command, Effect, Input, PlaybackController};
pub use error::{PlaybackError, ResolveError, Result};
pub use events::{PlaybackEvent, SkipReason};
pub use history::History;
pub use publisher::{PlaybackSnapshot, StatePublisher};
pub use queue::Queue;
pub use service::{PlaybackHandle, PlaybackService};
pub use source::{CatalogClient, DownloadRegistry, SourceResolver, TrackResolver};
pub use types::{
    parse_duration_hint, AudioQuality, EntryId, LoopMode, MediaUri, PlaybackConfig, PlaybackState,
    QueueEntry, ShuffleStrategy, Track,
};
