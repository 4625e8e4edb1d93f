//! Driver configuration

use crate::error::{AppError, Result};
use beatboss_playback::PlaybackConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "beatboss.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Default tracing filter, overridden by RUST_LOG
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub library: LibrarySettings,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub simulation: SimulationSettings,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LibrarySettings {
    /// JSON track list served by the static catalog
    #[serde(default)]
    pub tracks_file: Option<PathBuf>,

    /// Directory holding downloaded files named `<track id>.<ext>`
    #[serde(default)]
    pub downloads_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationSettings {
    /// How often the simulated engine advances its clock
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Playback speed multiplier (10.0 plays a 3 minute track in 18s)
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Duration assumed for media without a duration hint
    #[serde(default = "default_fallback_duration_ms")]
    pub fallback_duration_ms: u64,
}

impl SimulationSettings {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn fallback_duration(&self) -> Duration {
        Duration::from_millis(self.fallback_duration_ms)
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            speed: default_speed(),
            fallback_duration_ms: default_fallback_duration_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// An explicit `path` must exist. Without one, `beatboss.toml` is read
    /// when present. `BEATBOSS_` variables override both, with `__` between
    /// nested keys (`BEATBOSS_PLAYBACK__VOLUME=60`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                settings = settings.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                settings = settings
                    .add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false));
            }
        }

        settings = settings.add_source(
            config::Environment::with_prefix("BEATBOSS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.library.tracks_file.is_none() {
            return Err(AppError::Invalid(
                "no track list (pass --tracks or set library.tracks_file)".to_string(),
            ));
        }

        if self.playback.volume > 100 {
            return Err(AppError::Invalid(format!(
                "playback.volume must be 0-100, got {}",
                self.playback.volume
            )));
        }

        if self.playback.history_size == 0 {
            return Err(AppError::Invalid(
                "playback.history_size must be at least 1".to_string(),
            ));
        }

        if self.playback.event_buffer == 0 {
            return Err(AppError::Invalid(
                "playback.event_buffer must be at least 1".to_string(),
            ));
        }

        if !self.simulation.speed.is_finite() || self.simulation.speed <= 0.0 {
            return Err(AppError::Invalid(format!(
                "simulation.speed must be positive, got {}",
                self.simulation.speed
            )));
        }

        if self.simulation.tick_ms == 0 {
            return Err(AppError::Invalid(
                "simulation.tick_ms must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            library: LibrarySettings::default(),
            playback: PlaybackConfig::default(),
            simulation: SimulationSettings::default(),
        }
    }
}

// Default values
fn default_log_filter() -> String {
    "beatboss=info,beatboss_playback=info".to_string()
}

fn default_tick_ms() -> u64 {
    250
}

fn default_speed() -> f64 {
    1.0
}

fn default_fallback_duration_ms() -> u64 {
    180_000
}
