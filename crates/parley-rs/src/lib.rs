//! Streaming chat relay with bounded, per-session conversational memory.
//!
//! `parley-rs` sits between a chat client and an upstream chat-completion
//! API. Each request is answered as a live stream of text fragments, and when
//! the caller supplies a session id the relay keeps a short, bounded history
//! of the conversation so follow-up questions carry context.
//!
//! # Where to find things
//!
//! - **Session memory:** [`memory`] holds the per-session history store.
//!   [`SessionMemory`](memory::SessionMemory) is the active implementation,
//!   [`NoMemory`](memory::NoMemory) the inert one; both implement the
//!   [`Memory`](memory::Memory) trait, and
//!   [`build_memory()`](memory::build_memory) picks one from a flag.
//!   Eviction rules live in [`memory::eviction`].
//!
//! - **Upstream model:** [`api`] defines the
//!   [`CompletionSource`](api::CompletionSource) trait and the Azure OpenAI
//!   client that streams completions over SSE.
//!
//! - **Request handling:** [`chat::ChatOrchestrator`] reads history, opens the
//!   upstream stream, forwards fragments to the caller and records both turns
//!   in the background.
//!
//! - **Configuration:** [`config::Settings`] merges built-in defaults, a TOML
//!   file and environment overrides.
//!
//! # Data flow
//!
//! ```text
//! request ─▶ ChatOrchestrator ─get_history─▶ Memory
//!                 │
//!                 ├─ spawn add_message(user) ─────────────▶ Memory
//!                 ├─ CompletionSource::stream ─▶ fragments ─▶ caller
//!                 └─ on end / drop: add_message(assistant) ─▶ Memory
//! ```

pub mod api;
pub mod chat;
pub mod config;
pub mod memory;

use serde::{Deserialize, Serialize};

// ── Constants ──────────────────────────────────────────────────────

/// Fixed instruction sent as the first turn of every upstream prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an internal engineering assistant. Be concise. \
If clarification is needed, ask a question before answering.";

/// Longest accepted user message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 8000;

/// Approximate characters per token used for all size estimates.
pub const CHARS_PER_TOKEN: usize = 4;

// ── Turn types ─────────────────────────────────────────────────────

/// Speaker of a [`Turn`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One role-tagged message in a conversation.
///
/// Turns are immutable once built: the fields are private and there are no
/// setters, so a turn stored in a session history can only be read or dropped.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Length of the content in characters (not bytes).
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Approximate token count of a sequence of turns.
///
/// Total character count divided by [`CHARS_PER_TOKEN`], rounded down. This
/// is a cheap stand-in for a real tokenizer and is only ever used for
/// budgeting.
pub fn approx_tokens<'a>(turns: impl IntoIterator<Item = &'a Turn>) -> usize {
    let chars: usize = turns.into_iter().map(Turn::char_len).sum();
    chars / CHARS_PER_TOKEN
}
