//! Session id → history map with per-session mutual exclusion.
//!
//! Each session owns one [`SessionHistory`] behind its own async mutex, so
//! calls for the same session are serialized while calls for different
//! sessions never wait on each other. Entries are created lazily on first
//! write and are never removed for the lifetime of the process.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use super::history::SessionHistory;

/// Shared handle to one session's history and its lock.
pub type SessionSlot = Arc<Mutex<SessionHistory>>;

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionSlot>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the slot for `session_id`, creating an empty one if absent.
    ///
    /// Insertion goes through the map's entry API, so two first accesses
    /// racing on the same id end up with the same slot.
    pub fn get_or_create(&self, session_id: &str) -> SessionSlot {
        if let Some(slot) = self.sessions.get(session_id) {
            return slot.clone();
        }
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Return the slot for `session_id` without creating it.
    pub fn get(&self, session_id: &str) -> Option<SessionSlot> {
        self.sessions.get(session_id).map(|slot| slot.clone())
    }

    /// Run `f` against the session's history while holding its lock.
    ///
    /// The slot is created first if needed. The map shard is released before
    /// awaiting the lock; the lock itself is released when `f` returns or
    /// unwinds.
    pub async fn with_exclusive<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionHistory) -> T,
    ) -> T {
        let slot = self.get_or_create(session_id);
        let mut history = slot.lock().await;
        f(&mut history)
    }

    /// Like [`with_exclusive`](Self::with_exclusive), but returns `None`
    /// instead of creating an entry for an unseen session.
    pub async fn with_existing<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&SessionHistory) -> T,
    ) -> Option<T> {
        let slot = self.get(session_id)?;
        let history = slot.lock().await;
        Some(f(&history))
    }

    /// Number of sessions ever created.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
