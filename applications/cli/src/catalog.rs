//! Static catalog read from a JSON track list
//!
//! Stands in for the remote catalog during manual testing. Each entry can
//! script transport hiccups (`flaky`) and a premature end of stream
//! (`drop_at`) so recovery paths can be exercised by hand.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use beatboss_playback::error::CatalogError;
use beatboss_playback::{parse_duration_hint, AudioQuality, CatalogClient, Track};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::debug;

/// One track in the JSON list
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub title: String,
    pub artist: String,

    #[serde(default)]
    pub album: Option<String>,

    /// Duration hint as the catalog reports it ("3:25", "205", "205000")
    #[serde(default)]
    pub duration: Option<String>,

    #[serde(default)]
    pub quality: Option<AudioQuality>,

    /// Stream URL; entries without one are unavailable for streaming
    #[serde(default)]
    pub stream_url: Option<String>,

    /// Transport failures served before the URL is returned
    #[serde(default)]
    pub flaky: u32,

    /// Where the simulated stream cuts out on its first play
    #[serde(default)]
    pub drop_at: Option<String>,
}

impl CatalogEntry {
    pub fn duration_hint(&self) -> Option<Duration> {
        self.duration.as_deref().and_then(parse_duration_hint)
    }

    pub fn drop_point(&self) -> Option<Duration> {
        self.drop_at.as_deref().and_then(parse_duration_hint)
    }

    pub fn to_track(&self, downloaded: bool) -> Track {
        let mut track = Track::new(&self.id, &self.title, &self.artist);
        track.album = self.album.clone();
        track.duration = self.duration_hint();
        track.quality = self.quality;
        track.is_local = downloaded;
        track
    }
}

/// Read a JSON array of catalog entries
pub fn load_entries(path: &Path) -> Result<Vec<CatalogEntry>> {
    let raw = std::fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
    let entries = serde_json::from_str(&raw)?;
    Ok(entries)
}

struct Listing {
    stream_url: Option<String>,
    failures_left: AtomicU32,
}

/// In-memory catalog client
pub struct StaticCatalog {
    listings: HashMap<String, Listing>,
}

impl StaticCatalog {
    pub fn new(entries: &[CatalogEntry]) -> Self {
        let listings = entries
            .iter()
            .map(|entry| {
                (
                    entry.id.clone(),
                    Listing {
                        stream_url: entry.stream_url.clone(),
                        failures_left: AtomicU32::new(entry.flaky),
                    },
                )
            })
            .collect();
        Self { listings }
    }
}

#[async_trait]
impl CatalogClient for StaticCatalog {
    async fn stream_url(&self, track_id: &str) -> std::result::Result<String, CatalogError> {
        let Some(listing) = self.listings.get(track_id) else {
            return Err(CatalogError::Unavailable);
        };

        let flaked = listing
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if flaked {
            debug!(track_id, "Simulating catalog transport failure");
            return Err(CatalogError::Transport("simulated timeout".to_string()));
        }

        listing.stream_url.clone().ok_or(CatalogError::Unavailable)
    }
}
