//! Media backend adapter
//!
//! Abstracts the external audio engine. The controller is the only caller:
//! it hands over a source, drives transport, and reads back a status feed.
//! Every source is tagged with the play generation it was opened for so late
//! reports from a superseded source can be told apart.

use crate::error::BackendError;
use crate::types::MediaUri;
use async_trait::async_trait;
use std::time::Duration;

/// Play generation a backend source belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SourceTag(pub u64);

/// Engine-level processing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingState {
    #[default]
    Idle,
    Loading,
    Buffering,
    Ready,
    /// End of stream reached
    Completed,
}

/// One status report from the backend
#[derive(Debug, Clone, PartialEq)]
pub struct BackendStatus {
    /// Source this report describes
    pub tag: SourceTag,
    pub position: Duration,
    pub buffered: Duration,
    /// Duration as decoded, `None` until known
    pub duration: Option<Duration>,
    pub playing: bool,
    pub processing: ProcessingState,
}

impl BackendStatus {
    /// Status of a freshly opened source
    pub fn initial(tag: SourceTag) -> Self {
        Self {
            tag,
            position: Duration::ZERO,
            buffered: Duration::ZERO,
            duration: None,
            playing: false,
            processing: ProcessingState::Loading,
        }
    }
}

/// Asynchronous backend notification
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Position, buffering or processing state changed
    Status(BackendStatus),

    /// The stream failed mid-playback
    Error { tag: SourceTag, message: String },
}

/// External audio engine
///
/// Implementations push [`BackendEvent`]s on the channel handed to the
/// playback service and answer [`status`](MediaBackend::status) polls.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Open a source, optionally starting at an offset
    ///
    /// Does not start playback.
    async fn set_source(
        &self,
        uri: &MediaUri,
        start_at: Option<Duration>,
        tag: SourceTag,
    ) -> Result<(), BackendError>;

    async fn play(&self) -> Result<(), BackendError>;

    async fn pause(&self) -> Result<(), BackendError>;

    /// Stop and release the current source
    async fn stop(&self) -> Result<(), BackendError>;

    async fn seek(&self, position: Duration) -> Result<(), BackendError>;

    /// Volume in `0.0..=1.0`
    async fn set_volume(&self, volume: f32) -> Result<(), BackendError>;

    /// Current status, `None` when no source is open
    async fn status(&self) -> Option<BackendStatus>;
}
