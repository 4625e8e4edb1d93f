//! Directory-backed download registry

use crate::error::{AppError, Result};
use beatboss_playback::DownloadRegistry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const AUDIO_EXTENSIONS: &[&str] = &["flac", "mp3", "ogg", "opus", "m4a", "wav"];

/// Downloads found in one directory, keyed by file stem (the track id)
#[derive(Debug, Default)]
pub struct DirectoryRegistry {
    files: HashMap<String, PathBuf>,
}

impl DirectoryRegistry {
    /// Registry with nothing downloaded
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index the audio files directly under `root`
    pub fn scan(root: &Path) -> Result<Self> {
        let mut files = HashMap::new();

        for entry in std::fs::read_dir(root).map_err(|e| AppError::io(root, e))? {
            let path = entry.map_err(|e| AppError::io(root, e))?.path();
            if !path.is_file() || !is_audio(&path) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                files.insert(stem.to_string(), path.clone());
            }
        }

        debug!(root = %root.display(), count = files.len(), "Indexed downloads");
        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl DownloadRegistry for DirectoryRegistry {
    fn is_downloaded(&self, track_id: &str) -> bool {
        self.files.contains_key(track_id)
    }

    fn local_path(&self, track_id: &str) -> Option<PathBuf> {
        self.files.get(track_id).cloned()
    }
}
