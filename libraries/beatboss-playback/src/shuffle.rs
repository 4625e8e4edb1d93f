//! Shuffle algorithms for queue randomization
//!
//! Implements both pure random (Fisher-Yates) and smart shuffle algorithms

use crate::types::{QueueEntry, ShuffleStrategy};
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::collections::HashMap;

/// Shuffle queue entries with the given strategy
pub fn shuffle_entries(entries: &mut [QueueEntry], strategy: ShuffleStrategy) {
    match strategy {
        ShuffleStrategy::Random => shuffle_random(entries),
        ShuffleStrategy::Smart => shuffle_smart(entries),
    }
}

/// Pure random shuffle using Fisher-Yates algorithm
fn shuffle_random(entries: &mut [QueueEntry]) {
    let mut rng = thread_rng();
    entries.shuffle(&mut rng);
}

/// Smart shuffle algorithm
///
/// Keeps tracks by the same artist apart where possible:
/// 1. Group entries by artist
/// 2. Randomize within each group and randomize group order
/// 3. Take one entry per artist per round until all groups are empty
fn shuffle_smart(entries: &mut [QueueEntry]) {
    if entries.len() <= 2 {
        shuffle_random(entries);
        return;
    }

    let mut rng = thread_rng();

    let mut by_artist: HashMap<&str, Vec<QueueEntry>> = HashMap::new();
    for entry in entries.iter() {
        by_artist
            .entry(entry.track.artist.as_str())
            .or_default()
            .push(entry.clone());
    }

    let mut groups: Vec<Vec<QueueEntry>> = by_artist.into_values().collect();
    for group in &mut groups {
        group.shuffle(&mut rng);
    }
    groups.shuffle(&mut rng);

    let mut result = Vec::with_capacity(entries.len());
    let mut round = 0;
    while result.len() < entries.len() {
        for group in &groups {
            if let Some(entry) = group.get(round) {
                result.push(entry.clone());
            }
        }
        round += 1;
    }

    for (slot, entry) in entries.iter_mut().zip(result) {
        *slot = entry;
    }
}
