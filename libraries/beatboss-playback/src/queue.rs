//! Queue store
//!
//! Ordered list of queue entries plus a pointer to the current one.
//!
//! ```text
//! entries:  [ A ][ B ][ C ][ D ]
//!                  ^
//!               current = Some(1)
//! ```
//!
//! Every mutation keeps `current` on the same logical entry (same `EntryId`)
//! unless that entry itself is removed. The queue never talks to the backend;
//! the controller decides what a change means for playback.

use crate::shuffle::shuffle_entries;
use crate::types::{EntryId, LoopMode, QueueEntry, ShuffleStrategy, Track};
use std::sync::Arc;

/// What `previous` asks the controller to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviousTarget {
    /// Seek the current track back to zero
    RestartCurrent,

    /// Load the entry at this index
    Index(usize),
}

/// How to pick a successor after the current entry was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterRemoval {
    /// Past the end wraps to the first entry
    Wrap,

    /// Past the end falls back to the last entry
    Clamp,

    /// Past the end means nothing is left to play
    StopAtEnd,
}

/// Result of `remove_at`
#[derive(Debug, Clone, PartialEq)]
pub struct Removed {
    /// The removed entry
    pub entry: QueueEntry,

    /// Index it was removed from
    pub index: usize,

    /// True when the removed entry was the current one
    pub was_current: bool,
}

/// Queue store
#[derive(Debug, Clone, Default)]
pub struct Queue {
    entries: Vec<QueueEntry>,

    /// Index of the current entry, `None` when empty or stopped
    current: Option<usize>,

    /// Entry order before shuffle, kept while shuffled
    original_order: Option<Vec<EntryId>>,

    next_entry_id: u64,
}

impl Queue {
    /// Create new empty queue
    pub fn new() -> Self {
        Self::default()
    }

    fn make_entry(&mut self, track: Arc<Track>) -> QueueEntry {
        let entry_id = EntryId(self.next_entry_id);
        self.next_entry_id += 1;
        QueueEntry { entry_id, track }
    }

    /// Replace the queue wholesale
    ///
    /// `start_index` is clamped into range. Returns the effective starting
    /// entry, or `None` when `tracks` is empty. Shuffle state is cleared.
    pub fn set_queue(&mut self, tracks: Vec<Arc<Track>>, start_index: usize) -> Option<&QueueEntry> {
        self.entries.clear();
        self.original_order = None;

        for track in tracks {
            let entry = self.make_entry(track);
            self.entries.push(entry);
        }

        self.current = if self.entries.is_empty() {
            None
        } else {
            Some(start_index.min(self.entries.len() - 1))
        };

        self.current_entry()
    }

    /// Insert right after the current entry
    ///
    /// With no current entry the track goes to the front.
    pub fn insert_after_current(&mut self, track: Arc<Track>) -> EntryId {
        let entry = self.make_entry(track);
        let entry_id = entry.entry_id;
        let position = self.current.map_or(0, |c| c + 1);
        self.entries.insert(position, entry);
        entry_id
    }

    /// Add to the end of the queue
    pub fn append(&mut self, track: Arc<Track>) -> EntryId {
        let entry = self.make_entry(track);
        let entry_id = entry.entry_id;
        self.entries.push(entry);
        entry_id
    }

    /// Remove the entry at `index`
    ///
    /// Removing before the current entry shifts `current` down so it keeps
    /// pointing at the same entry. Removing the current entry clears
    /// `current`; the caller picks a successor with `successor_after_removal`.
    pub fn remove_at(&mut self, index: usize) -> Option<Removed> {
        if index >= self.entries.len() {
            return None;
        }

        let entry = self.entries.remove(index);
        let was_current = self.current == Some(index);

        match self.current {
            Some(c) if c == index => self.current = None,
            Some(c) if index < c => self.current = Some(c - 1),
            _ => {}
        }

        if let Some(order) = self.original_order.as_mut() {
            order.retain(|id| *id != entry.entry_id);
        }

        Some(Removed {
            entry,
            index,
            was_current,
        })
    }

    /// Index that should play after the entry at `removed_index` was removed
    ///
    /// The entry that slid into `removed_index` comes next. Past the end the
    /// policy decides. Returns `None` when the queue is empty.
    pub fn successor_after_removal(&self, removed_index: usize, policy: AfterRemoval) -> Option<usize> {
        let len = self.entries.len();
        if len == 0 {
            return None;
        }
        if removed_index < len {
            return Some(removed_index);
        }
        match policy {
            AfterRemoval::Wrap => Some(0),
            AfterRemoval::Clamp => Some(len - 1),
            AfterRemoval::StopAtEnd => None,
        }
    }

    /// Move the current entry to the end of the queue
    ///
    /// Used by the loop-all completion policy so the queue length stays
    /// constant. Returns the index the next entry should play from, or
    /// `None` when there is no current entry.
    pub fn rotate_current_to_end(&mut self) -> Option<usize> {
        let index = self.current?;
        let entry = self.entries.remove(index);
        let next = if index < self.entries.len() { index } else { 0 };
        self.entries.push(entry);
        self.current = None;
        Some(next)
    }

    /// Clear entire queue
    pub fn clear(&mut self) {
        self.entries.clear();
        self.current = None;
        self.original_order = None;
    }

    /// Shuffle, keeping the current entry first
    ///
    /// The order before shuffling is saved for `unshuffle`. Shuffling an
    /// already shuffled queue reshuffles but keeps the first saved order.
    pub fn shuffle(&mut self, strategy: ShuffleStrategy) {
        if self.original_order.is_none() {
            self.original_order = Some(self.entries.iter().map(|e| e.entry_id).collect());
        }

        let current = self.current.map(|c| self.entries.remove(c));
        shuffle_entries(&mut self.entries, strategy);

        if let Some(entry) = current {
            self.entries.insert(0, entry);
            self.current = Some(0);
        }
    }

    /// Restore the pre-shuffle order, best effort
    ///
    /// Entries removed while shuffled stay removed; entries added while
    /// shuffled follow the restored ones in their current relative order.
    /// The current entry keeps its identity.
    pub fn unshuffle(&mut self) {
        let Some(order) = self.original_order.take() else {
            return;
        };

        let current_id = self.current_entry().map(|e| e.entry_id);
        let mut remaining = std::mem::take(&mut self.entries);
        let mut restored = Vec::with_capacity(remaining.len());

        for id in order {
            if let Some(pos) = remaining.iter().position(|e| e.entry_id == id) {
                restored.push(remaining.remove(pos));
            }
        }
        restored.extend(remaining);

        self.entries = restored;
        self.current = current_id.and_then(|id| self.index_of(id));
    }

    /// Whether the queue is currently shuffled
    pub fn is_shuffled(&self) -> bool {
        self.original_order.is_some()
    }

    /// Next index given the loop mode
    ///
    /// Pure function of (length, current, loop mode):
    /// - `One` stays on the current entry
    /// - `All` wraps past the end
    /// - `Off` returns `None` past the end
    ///
    /// With no current entry the first entry comes next.
    pub fn advance(&self, loop_mode: LoopMode) -> Option<usize> {
        next_index(self.entries.len(), self.current, loop_mode)
    }

    /// Target for "previous"
    ///
    /// Past `threshold` into the track, restarts it. Otherwise steps back one
    /// entry, wrapping to the last entry under `All`. At the first entry with
    /// no wrap, restarts the current track.
    pub fn previous(&self, elapsed: std::time::Duration, threshold: std::time::Duration, loop_mode: LoopMode) -> Option<PreviousTarget> {
        let len = self.entries.len();
        if len == 0 {
            return None;
        }

        let Some(current) = self.current else {
            return Some(PreviousTarget::Index(len - 1));
        };

        if elapsed >= threshold {
            return Some(PreviousTarget::RestartCurrent);
        }

        if current > 0 {
            Some(PreviousTarget::Index(current - 1))
        } else if loop_mode == LoopMode::All && len > 1 {
            Some(PreviousTarget::Index(len - 1))
        } else {
            Some(PreviousTarget::RestartCurrent)
        }
    }

    /// Point `current` at `index`
    ///
    /// Returns `false` and leaves the queue untouched when out of range.
    pub fn set_current(&mut self, index: usize) -> bool {
        if index < self.entries.len() {
            self.current = Some(index);
            true
        } else {
            false
        }
    }

    /// Forget the current entry (stopped)
    pub fn clear_current(&mut self) {
        self.current = None;
    }

    /// Current index
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Current entry
    pub fn current_entry(&self) -> Option<&QueueEntry> {
        self.current.and_then(|c| self.entries.get(c))
    }

    /// Index of an entry by identity
    pub fn index_of(&self, entry_id: EntryId) -> Option<usize> {
        self.entries.iter().position(|e| e.entry_id == entry_id)
    }

    /// All entries in play order
    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Next index for a queue of `len` entries
pub fn next_index(len: usize, current: Option<usize>, loop_mode: LoopMode) -> Option<usize> {
    if len == 0 {
        return None;
    }

    let Some(current) = current.filter(|c| *c < len) else {
        return Some(0);
    };

    match loop_mode {
        LoopMode::One => Some(current),
        LoopMode::All => Some((current + 1) % len),
        LoopMode::Off => (current + 1 < len).then_some(current + 1),
    }
}
