//! Source resolution
//!
//! Turns a track into something the backend can open: the downloaded file
//! when it really exists on disk, otherwise a fresh stream URL from the
//! catalog with bounded retry on transient failures.

use crate::error::{CatalogError, ResolveError};
use crate::types::{MediaUri, Track};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Remote catalog client
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fresh stream URL for a track
    async fn stream_url(&self, track_id: &str) -> Result<String, CatalogError>;
}

/// Read-only view of the download manager's registry
pub trait DownloadRegistry: Send + Sync {
    fn is_downloaded(&self, track_id: &str) -> bool;

    fn local_path(&self, track_id: &str) -> Option<PathBuf>;
}

/// Anything that can turn a track into a playable URI
///
/// The controller only sees this trait, so tests can swap in a scripted
/// resolver.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, track: &Track) -> Result<MediaUri, ResolveError>;
}

/// Local-first resolver backed by the catalog
pub struct SourceResolver {
    catalog: Arc<dyn CatalogClient>,
    downloads: Arc<dyn DownloadRegistry>,
    max_retries: u32,
    retry_delay: Duration,
}

impl SourceResolver {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        downloads: Arc<dyn DownloadRegistry>,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            catalog,
            downloads,
            max_retries,
            retry_delay,
        }
    }

    /// Downloaded file for the track, if the registry knows one and it exists
    async fn local_file(&self, track_id: &str) -> Option<PathBuf> {
        if !self.downloads.is_downloaded(track_id) {
            return None;
        }
        let path = self.downloads.local_path(track_id)?;

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => {
                warn!(track_id, path = %path.display(), "Registered download missing on disk");
                None
            }
        }
    }

    async fn remote_url(&self, track_id: &str) -> Result<String, ResolveError> {
        let attempts = self.max_retries + 1;
        let mut attempt = 1;

        loop {
            match self.catalog.stream_url(track_id).await {
                Ok(url) => return Ok(url),
                Err(CatalogError::Unavailable) => {
                    return Err(ResolveError::NotFound {
                        track_id: track_id.to_string(),
                    });
                }
                Err(CatalogError::Transport(message)) if attempt < attempts => {
                    warn!(track_id, attempt, error = %message, "Stream URL request failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(CatalogError::Transport(message)) => {
                    return Err(ResolveError::TransportFailure {
                        track_id: track_id.to_string(),
                        attempts: attempt,
                        message,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl TrackResolver for SourceResolver {
    async fn resolve(&self, track: &Track) -> Result<MediaUri, ResolveError> {
        if let Some(path) = self.local_file(&track.id).await {
            debug!(track_id = %track.id, "Resolved to local file");
            return Ok(MediaUri::Local(path));
        }

        let url = self.remote_url(&track.id).await?;
        debug!(track_id = %track.id, "Resolved to remote stream");
        Ok(MediaUri::Remote(url))
    }
}
