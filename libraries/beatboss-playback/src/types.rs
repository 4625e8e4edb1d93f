//! Core types for the playback session

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Track metadata handed to the queue
///
/// Immutable once constructed. The controller only changes queue membership
/// and order, never track content, so tracks are shared as `Arc<Track>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Stable identifier, shared by the catalog and the download registry
    pub id: String,

    /// Track title
    pub title: String,

    /// Artist name
    pub artist: String,

    /// Album name (optional)
    #[serde(default)]
    pub album: Option<String>,

    /// Expected duration from catalog metadata
    #[serde(default)]
    pub duration: Option<Duration>,

    /// Audio quality descriptor, when the catalog reports one
    #[serde(default)]
    pub quality: Option<AudioQuality>,

    /// Whether the catalog marked this track as downloaded
    #[serde(default)]
    pub is_local: bool,
}

impl Track {
    /// Create a track with only the required fields set
    pub fn new(id: impl Into<String>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            album: None,
            duration: None,
            quality: None,
            is_local: false,
        }
    }

    /// Set the expected duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Audio quality reported by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioQuality {
    /// Maximum bit depth
    pub bit_depth: Option<u8>,

    /// Maximum sampling rate in kHz
    pub sample_rate_khz: Option<f32>,

    /// Hi-res flag as reported by the catalog
    #[serde(default)]
    pub hi_res: bool,
}

impl AudioQuality {
    /// Short label for hi-res tracks, e.g. "24bit / 96kHz"
    ///
    /// Returns `None` for non hi-res tracks or when either value is missing.
    pub fn label(&self) -> Option<String> {
        if !self.hi_res {
            return None;
        }
        match (self.bit_depth, self.sample_rate_khz) {
            (Some(bits), Some(rate)) => Some(format!("{}bit / {}kHz", bits, rate)),
            _ => None,
        }
    }
}

/// Parse a duration hint from catalog metadata
///
/// Accepts "m:ss", "h:mm:ss", or a plain number. Numbers above 10000 are
/// taken as milliseconds, smaller ones as seconds.
pub fn parse_duration_hint(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if raw.contains(':') {
        let parts: Vec<u64> = raw
            .split(':')
            .map(|p| p.trim().parse::<u64>())
            .collect::<std::result::Result<_, _>>()
            .ok()?;

        let secs = match parts.as_slice() {
            [m, s] => m.checked_mul(60)?.checked_add(*s)?,
            [h, m, s] => h
                .checked_mul(3600)?
                .checked_add(m.checked_mul(60)?)?
                .checked_add(*s)?,
            _ => return None,
        };
        return Some(Duration::from_secs(secs));
    }

    let value: f64 = raw.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    if value > 10_000.0 {
        Some(Duration::from_millis(value as u64))
    } else {
        Some(Duration::from_secs_f64(value))
    }
}

/// Identity of one queue slot
///
/// Assigned by the queue on insertion. Two entries may hold the same track id;
/// their entry ids still differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub u64);

/// A track as it sits in the queue
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub entry_id: EntryId,
    pub track: Arc<Track>,
}

/// Loop mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Stop when the queue runs out
    #[default]
    Off,

    /// Cycle through the queue
    All,

    /// Replay the current track
    One,
}

impl LoopMode {
    /// Next mode in the Off → All → One → Off cycle
    pub fn cycle(self) -> Self {
        match self {
            LoopMode::Off => LoopMode::All,
            LoopMode::All => LoopMode::One,
            LoopMode::One => LoopMode::Off,
        }
    }

    /// Mode used when the user skips manually
    ///
    /// A manual skip under `One` moves on and wraps like `All`.
    pub fn for_manual_skip(self) -> Self {
        match self {
            LoopMode::One => LoopMode::All,
            other => other,
        }
    }
}

/// Shuffle algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShuffleStrategy {
    /// Fisher-Yates
    #[default]
    Random,

    /// Keep tracks by the same artist apart
    Smart,
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    /// No track loaded
    Idle,

    /// Source being resolved and handed to the backend
    Loading,

    /// Currently playing
    Playing,

    /// Paused mid-track
    Paused,

    /// Re-resolving after a transport error or premature stop
    Recovering,

    /// Queue exhausted or explicitly stopped
    Stopped,
}

impl PlaybackState {
    /// Whether a track is loaded or being loaded
    pub fn is_active(self) -> bool {
        matches!(
            self,
            PlaybackState::Loading
                | PlaybackState::Playing
                | PlaybackState::Paused
                | PlaybackState::Recovering
        )
    }
}

/// Playable location of a track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaUri {
    /// Downloaded file on disk
    Local(PathBuf),

    /// Remote stream URL
    Remote(String),
}

impl MediaUri {
    pub fn is_local(&self) -> bool {
        matches!(self, MediaUri::Local(_))
    }
}

impl fmt::Display for MediaUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaUri::Local(path) => write!(f, "file://{}", path.display()),
            MediaUri::Remote(url) => f.write_str(url),
        }
    }
}

/// Configuration for the playback session
///
/// Durations are stored in milliseconds so the struct maps directly onto
/// configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Number of distinct tracks kept in play history (default: 5)
    pub history_size: usize,

    /// Initial volume (0-100, default: 80)
    pub volume: u8,

    /// Initial loop mode (default: Off)
    pub loop_mode: LoopMode,

    /// Shuffle algorithm used when shuffle is enabled (default: Random)
    pub shuffle_strategy: ShuffleStrategy,

    /// Retries after the first attempt, for resolution and restarts (default: 2)
    pub max_retries: u32,

    /// Fixed delay between retries (default: 1000ms)
    pub retry_delay_ms: u64,

    /// How far before the expected end a completion still counts as real (default: 2000ms)
    pub completion_tolerance_ms: u64,

    /// Past this position, "previous" restarts the current track (default: 3000ms)
    pub previous_restart_threshold_ms: u64,

    /// Backend status polling period (default: 500ms)
    pub position_poll_interval_ms: u64,

    /// Capacity of the notification channel (default: 64)
    pub event_buffer: usize,
}

impl PlaybackConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn completion_tolerance(&self) -> Duration {
        Duration::from_millis(self.completion_tolerance_ms)
    }

    pub fn previous_restart_threshold(&self) -> Duration {
        Duration::from_millis(self.previous_restart_threshold_ms)
    }

    pub fn position_poll_interval(&self) -> Duration {
        Duration::from_millis(self.position_poll_interval_ms.max(1))
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            history_size: 5,
            volume: 80,
            loop_mode: LoopMode::Off,
            shuffle_strategy: ShuffleStrategy::Random,
            max_retries: 2,
            retry_delay_ms: 1000,
            completion_tolerance_ms: 2000,
            previous_restart_threshold_ms: 3000,
            position_poll_interval_ms: 500,
            event_buffer: 64,
        }
    }
}
