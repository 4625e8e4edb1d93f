//! Beatboss - headless playback session driver
//!
//! Plays a JSON track list through the playback session with a simulated
//! audio engine, logging every state change and notification.

mod catalog;
mod config;
mod downloads;
mod error;
mod simulator;

use anyhow::Context;
use beatboss_playback::{
    DownloadRegistry, LoopMode, MediaUri, PlaybackEvent, PlaybackHandle, PlaybackService,
    PlaybackSnapshot, PlaybackState, SourceResolver, Track,
};
use catalog::{CatalogEntry, StaticCatalog};
use clap::{Parser, ValueEnum};
use crate::config::AppConfig;
use downloads::DirectoryRegistry;
use simulator::{SimulatedBackend, SimulatedMedia};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "beatboss")]
#[command(about = "Play a track list through the Beatboss playback session", long_about = None)]
struct Cli {
    /// Configuration file path (default: ./beatboss.toml when present)
    #[arg(short, long, env = "BEATBOSS_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// JSON track list
    #[arg(short, long)]
    tracks: Option<PathBuf>,

    /// Directory of downloaded files named <track id>.<ext>
    #[arg(short, long)]
    downloads: Option<PathBuf>,

    /// Queue index to start from
    #[arg(short, long, default_value_t = 0)]
    start: usize,

    /// Loop mode
    #[arg(short, long = "loop", value_enum)]
    loop_mode: Option<LoopArg>,

    /// Shuffle the queue once loaded
    #[arg(long)]
    shuffle: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LoopArg {
    Off,
    All,
    One,
}

impl From<LoopArg> for LoopMode {
    fn from(arg: LoopArg) -> Self {
        match arg {
            LoopArg::Off => LoopMode::Off,
            LoopArg::All => LoopMode::All,
            LoopArg::One => LoopMode::One,
        }
    }
}

impl Cli {
    /// Command-line flags win over file and environment
    fn apply(&self, config: &mut AppConfig) {
        if let Some(tracks) = &self.tracks {
            config.library.tracks_file = Some(tracks.clone());
        }
        if let Some(downloads) = &self.downloads {
            config.library.downloads_dir = Some(downloads.clone());
        }
        if let Some(mode) = self.loop_mode {
            config.playback.loop_mode = mode.into();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    cli.apply(&mut config);
    config.validate()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let tracks_file = config
        .library
        .tracks_file
        .clone()
        .context("no track list configured")?;
    let entries = catalog::load_entries(&tracks_file)?;
    if entries.is_empty() {
        anyhow::bail!("track list {} is empty", tracks_file.display());
    }

    let downloads = match &config.library.downloads_dir {
        Some(dir) => DirectoryRegistry::scan(dir)?,
        None => DirectoryRegistry::empty(),
    };
    info!(
        tracks = entries.len(),
        downloads = downloads.len(),
        "Library loaded"
    );

    let fallback = config.simulation.fallback_duration();
    let (backend, backend_events) = SimulatedBackend::spawn(
        simulated_media(&entries, &downloads, fallback),
        fallback,
        config.simulation.speed,
        config.simulation.tick(),
    );

    let tracks: Vec<Track> = entries
        .iter()
        .map(|entry| entry.to_track(downloads.is_downloaded(&entry.id)))
        .collect();

    let resolver = SourceResolver::new(
        Arc::new(StaticCatalog::new(&entries)),
        Arc::new(downloads),
        config.playback.max_retries,
        config.playback.retry_delay(),
    );

    let (handle, service) = PlaybackService::spawn(
        config.playback.clone(),
        Arc::new(resolver),
        backend,
        backend_events,
    );

    monitor(&handle, tracks, cli.start, cli.shuffle).await?;

    if let Err(e) = handle.stop() {
        debug!(error = %e, "Service already stopped");
    }
    drop(handle);
    service.await.context("playback service panicked")?;

    info!("Goodbye");
    Ok(())
}

/// Engine-side knowledge of every source the resolver can hand out
fn simulated_media(
    entries: &[CatalogEntry],
    downloads: &DirectoryRegistry,
    fallback: Duration,
) -> HashMap<String, SimulatedMedia> {
    let mut media = HashMap::new();

    for entry in entries {
        let mut source = SimulatedMedia::new(entry.duration_hint().unwrap_or(fallback));
        if let Some(drop_at) = entry.drop_point() {
            source = source.dropping_at(drop_at);
        }

        if let Some(url) = &entry.stream_url {
            media.insert(MediaUri::Remote(url.clone()).to_string(), source);
        }
        if let Some(path) = downloads.local_path(&entry.id) {
            // Downloaded copies play through
            media.insert(
                MediaUri::Local(path).to_string(),
                SimulatedMedia::new(source.duration),
            );
        }
    }

    media
}

/// Load the queue and log until it runs out or the user interrupts
async fn monitor(
    handle: &PlaybackHandle,
    tracks: Vec<Track>,
    start: usize,
    shuffle: bool,
) -> anyhow::Result<()> {
    let mut snapshots = handle.subscribe();
    let mut events = handle.subscribe_events();

    handle.load_queue(tracks, start)?;
    if shuffle {
        handle.toggle_shuffle()?;
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut last = Progress::default();

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                return Ok(());
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    warn!("Playback service stopped");
                    return Ok(());
                }
                let snapshot = snapshots.borrow_and_update().clone();
                last.report(&snapshot);
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if log_event(&event) {
                        return Ok(());
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!(missed, "Notification stream lagged"),
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }
}

/// Last snapshot fields worth an info line
#[derive(Debug, Default, PartialEq)]
struct Progress {
    state: Option<PlaybackState>,
    track_id: Option<String>,
    queue_len: usize,
    loop_mode: LoopMode,
    shuffle: bool,
}

impl Progress {
    fn report(&mut self, snapshot: &PlaybackSnapshot) {
        let next = Progress {
            state: Some(snapshot.state),
            track_id: snapshot.current_track.as_ref().map(|t| t.id.clone()),
            queue_len: snapshot.queue.len(),
            loop_mode: snapshot.loop_mode,
            shuffle: snapshot.shuffle,
        };

        if next == *self {
            debug!(
                position = ?snapshot.position,
                progress = ?snapshot.progress(),
                "Position"
            );
            return;
        }

        info!(
            state = ?snapshot.state,
            track_id = next.track_id.as_deref().unwrap_or("-"),
            index = ?snapshot.current_index,
            queue_len = next.queue_len,
            loop_mode = ?snapshot.loop_mode,
            shuffle = snapshot.shuffle,
            "Session"
        );
        *self = next;
    }
}

/// Log a notification; true once the session has nothing left to play
fn log_event(event: &PlaybackEvent) -> bool {
    match event {
        PlaybackEvent::TrackStarted { track, .. } => {
            let quality = track.quality.and_then(|q| q.label());
            info!(
                track_id = %track.id,
                title = %track.title,
                artist = %track.artist,
                local = track.is_local,
                quality = quality.as_deref().unwrap_or("-"),
                "Now playing"
            );
            false
        }
        PlaybackEvent::TrackSkipped { track_id, reason } => {
            warn!(%track_id, ?reason, "Skipped unplayable track");
            false
        }
        PlaybackEvent::Recovering { track_id, attempt } => {
            warn!(%track_id, attempt, "Recovering playback");
            false
        }
        PlaybackEvent::QueueExhausted => {
            info!("Queue finished");
            true
        }
        PlaybackEvent::NothingPlayable => {
            warn!("Nothing in the queue is playable");
            true
        }
    }
}
