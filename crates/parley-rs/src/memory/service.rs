//! The memory capability set and its two implementations.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::eviction::Limits;
use super::store::SessionStore;
use crate::{Role, Turn, approx_tokens};

/// Failure of a memory operation.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The backing infrastructure could not complete the operation.
    #[error("memory unavailable: {0}")]
    Unavailable(String),
}

/// Boxed future returned by [`Memory`] operations.
pub type MemoryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, MemoryError>> + Send + 'a>>;

/// Diagnostic view of one session.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum SessionSnapshot {
    Active {
        session_id: String,
        messages: Vec<Turn>,
        approx_tokens: usize,
        count: usize,
        limits: Limits,
    },
    Disabled {
        session_id: String,
        disabled: bool,
    },
}

/// Session memory as seen by the rest of the relay.
///
/// Callers hold an `Arc<dyn Memory>` and never need to know whether it is
/// the active [`SessionMemory`] or the inert [`NoMemory`].
pub trait Memory: Send + Sync {
    /// Append a turn to the session and enforce the history bounds.
    fn add_message<'a>(
        &'a self,
        session_id: &'a str,
        role: Role,
        content: String,
    ) -> MemoryFuture<'a, ()>;

    /// Copy of the session's turns, oldest first. Empty for unseen sessions.
    fn get_history<'a>(&'a self, session_id: &'a str) -> MemoryFuture<'a, Vec<Turn>>;

    /// Diagnostic view built from a single history read.
    fn snapshot<'a>(&'a self, session_id: &'a str) -> MemoryFuture<'a, SessionSnapshot>;
}

/// In-process bounded memory: one history per session id.
#[derive(Debug, Default)]
pub struct SessionMemory {
    store: SessionStore,
    limits: Limits,
}

impl SessionMemory {
    pub fn new(limits: Limits) -> Self {
        Self {
            store: SessionStore::new(),
            limits,
        }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }
}

impl Memory for SessionMemory {
    fn add_message<'a>(
        &'a self,
        session_id: &'a str,
        role: Role,
        content: String,
    ) -> MemoryFuture<'a, ()> {
        Box::pin(async move {
            let turn = Turn::new(role, content);
            let evicted = self
                .store
                .with_exclusive(session_id, |history| {
                    history.append_bounded(turn, &self.limits)
                })
                .await;
            if evicted > 0 {
                debug!("Evicted {evicted} oldest turn(s) from session {session_id}");
            }
            Ok(())
        })
    }

    fn get_history<'a>(&'a self, session_id: &'a str) -> MemoryFuture<'a, Vec<Turn>> {
        Box::pin(async move {
            Ok(self
                .store
                .with_existing(session_id, |history| history.to_vec())
                .await
                .unwrap_or_default())
        })
    }

    fn snapshot<'a>(&'a self, session_id: &'a str) -> MemoryFuture<'a, SessionSnapshot> {
        Box::pin(async move {
            let messages = self.get_history(session_id).await?;
            Ok(SessionSnapshot::Active {
                session_id: session_id.to_string(),
                approx_tokens: approx_tokens(&messages),
                count: messages.len(),
                messages,
                limits: self.limits,
            })
        })
    }
}

/// Memory that remembers nothing. Used when memory is disabled, and for
/// requests that carry no session id.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMemory;

impl Memory for NoMemory {
    fn add_message<'a>(
        &'a self,
        _session_id: &'a str,
        _role: Role,
        _content: String,
    ) -> MemoryFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn get_history<'a>(&'a self, _session_id: &'a str) -> MemoryFuture<'a, Vec<Turn>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn snapshot<'a>(&'a self, session_id: &'a str) -> MemoryFuture<'a, SessionSnapshot> {
        Box::pin(async move {
            Ok(SessionSnapshot::Disabled {
                session_id: session_id.to_string(),
                disabled: true,
            })
        })
    }
}

/// Pick the memory implementation once, at startup.
pub fn build_memory(enabled: bool, limits: Limits) -> Arc<dyn Memory> {
    if enabled {
        Arc::new(SessionMemory::new(limits))
    } else {
        Arc::new(NoMemory)
    }
}
