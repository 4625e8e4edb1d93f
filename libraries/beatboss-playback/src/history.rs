//! Play history
//!
//! Bounded list of recently started tracks, most recent first. A track that
//! starts again moves to the front instead of appearing twice.

use crate::types::Track;
use std::collections::VecDeque;
use std::sync::Arc;

/// Recently started tracks
#[derive(Debug, Clone)]
pub struct History {
    /// Most recent at the front
    tracks: VecDeque<Arc<Track>>,

    max_size: usize,
}

impl History {
    /// Create new history with specified maximum size
    pub fn new(max_size: usize) -> Self {
        Self {
            tracks: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Record a track start
    ///
    /// Duplicates by track id are collapsed; the oldest entry falls off when
    /// the history is full.
    pub fn record(&mut self, track: Arc<Track>) {
        if self.max_size == 0 {
            return;
        }

        self.tracks.retain(|t| t.id != track.id);
        self.tracks.push_front(track);
        self.tracks.truncate(self.max_size);
    }

    /// Most recently started track
    pub fn latest(&self) -> Option<&Arc<Track>> {
        self.tracks.front()
    }

    /// All tracks, most recent first
    pub fn to_vec(&self) -> Vec<Arc<Track>> {
        self.tracks.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(5)
    }
}
