//! Bounded per-session conversational memory.
//!
//! The pieces, bottom-up:
//!
//! - [`eviction`]: the pure oldest-first policy and the [`Limits`] it enforces.
//! - [`SessionHistory`]: the ordered turns of one session.
//! - [`SessionStore`]: session id → history, with one lock per session.
//! - [`Memory`]: the async capability set the rest of the relay depends on,
//!   with [`SessionMemory`] (active) and [`NoMemory`] (inert) behind it.

pub mod eviction;
mod history;
mod service;
mod store;

pub use eviction::{DEFAULT_MAX_APPROX_TOKENS, DEFAULT_MAX_MESSAGES, Limits, evict_count};
pub use history::SessionHistory;
pub use service::{
    Memory, MemoryError, MemoryFuture, NoMemory, SessionMemory, SessionSnapshot, build_memory,
};
pub use store::{SessionSlot, SessionStore};
