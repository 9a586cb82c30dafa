//! Turn eviction: decide how many of the oldest turns a history must drop.
//!
//! A session history is bounded two ways at once: by the number of turns and
//! by an approximate token budget (see [`approx_tokens`](crate::approx_tokens)).
//! Eviction is strictly oldest-first and removes whole turns; a turn is never
//! truncated or reordered. The policy is a pure function of its inputs, so it
//! can run while the caller holds the session lock without touching anything
//! else.

use serde::{Deserialize, Serialize};

use crate::{CHARS_PER_TOKEN, Turn};

/// Default maximum number of turns kept per session.
pub const DEFAULT_MAX_MESSAGES: usize = 40;

/// Default approximate token budget per session.
pub const DEFAULT_MAX_APPROX_TOKENS: usize = 2400;

/// Per-store bounds on a session history. Fixed once the store is built.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of turns retained.
    pub max_messages: usize,
    /// Maximum approximate token count of all retained turns.
    pub max_approx_tokens: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            max_approx_tokens: DEFAULT_MAX_APPROX_TOKENS,
        }
    }
}

impl Limits {
    pub fn new(max_messages: usize, max_approx_tokens: usize) -> Self {
        Self {
            max_messages,
            max_approx_tokens,
        }
    }

    /// Whether a history of `count` turns totalling `approx_tokens` is within bounds.
    pub fn admits(&self, count: usize, approx_tokens: usize) -> bool {
        count <= self.max_messages && approx_tokens <= self.max_approx_tokens
    }
}

/// Number of leading (oldest) turns to remove so the rest fits `limits`.
///
/// Drops one turn at a time and re-checks both bounds after each removal.
/// Stops as soon as both bounds hold or nothing is left, so the result is
/// never larger than the number of turns. Calling it again on the surviving
/// turns returns `0`.
pub fn evict_count<'a>(turns: impl IntoIterator<Item = &'a Turn>, limits: &Limits) -> usize {
    let sizes: Vec<usize> = turns.into_iter().map(Turn::char_len).collect();
    let mut chars: usize = sizes.iter().sum();
    let mut dropped = 0;

    for size in &sizes {
        let remaining = sizes.len() - dropped;
        if limits.admits(remaining, chars / CHARS_PER_TOKEN) {
            break;
        }
        chars -= size;
        dropped += 1;
    }

    dropped
}
