//! Ordered turn history for a single session.

use std::collections::VecDeque;

use super::eviction::{Limits, evict_count};
use crate::{Turn, approx_tokens};

/// The turns of one session, oldest first.
///
/// Only [`SessionStore`](super::SessionStore) hands out mutable access, and
/// only to the holder of that session's lock.
#[derive(Debug, Default, Clone)]
pub struct SessionHistory {
    turns: VecDeque<Turn>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn, then evict oldest turns until `limits` hold again.
    ///
    /// Returns the number of turns evicted.
    pub fn append_bounded(&mut self, turn: Turn, limits: &Limits) -> usize {
        self.turns.push_back(turn);
        let excess = evict_count(&self.turns, limits);
        self.drop_oldest(excess)
    }

    /// Remove up to `n` turns from the front. Returns how many were removed.
    pub fn drop_oldest(&mut self, n: usize) -> usize {
        let n = n.min(self.turns.len());
        self.turns.drain(..n);
        n
    }

    /// Independent copy of the current turns, oldest first.
    pub fn to_vec(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn approx_tokens(&self) -> usize {
        approx_tokens(&self.turns)
    }
}
