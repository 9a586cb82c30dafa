//! Per-request chat orchestration.
//!
//! [`ChatOrchestrator::respond`] validates the message, reads the session's
//! history, opens the upstream stream and hands back a [`ChatStream`] of text
//! fragments. Memory writes happen off the response path:
//!
//! 1. The user turn is persisted on a spawned task as soon as the prompt is
//!    built, so the first fragment is never held up by a memory write.
//! 2. The assistant turn is persisted once the stream finishes, fails, or is
//!    dropped by the caller, with whatever text was forwarded up to then.
//!    That task first waits for the user-turn task so the two land in
//!    conversational order.
//!
//! Failures after validation never reach the caller as errors. History
//! reads degrade to an empty history, malformed fragments are skipped,
//! memory writes are logged, and an upstream failure becomes a trailing
//! `[error] <detail>` fragment.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::api::{CompletionSource, EventStream, StreamEvent};
use crate::memory::Memory;
use crate::{DEFAULT_SYSTEM_PROMPT, MAX_MESSAGE_CHARS, Role, Turn};

/// Prefix of the in-band fragment that reports an upstream failure.
pub const ERROR_TRAILER_PREFIX: &str = "\n[error] ";

/// Boxed stream of text fragments returned to the caller.
pub type ChatStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Inbound chat request.
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    /// Opts the request into session memory. Absent or empty means no memory.
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Rejections raised before any memory or upstream work starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("Empty message")]
    EmptyMessage,
    #[error("Message too long ({chars} chars > {max})")]
    MessageTooLong { chars: usize, max: usize },
}

/// Wires memory and an upstream source together for each request.
#[derive(Clone)]
pub struct ChatOrchestrator {
    memory: Arc<dyn Memory>,
    source: Arc<dyn CompletionSource>,
    system_prompt: String,
    max_message_chars: usize,
}

impl ChatOrchestrator {
    pub fn new(memory: Arc<dyn Memory>, source: Arc<dyn CompletionSource>) -> Self {
        Self {
            memory,
            source,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_message_chars: MAX_MESSAGE_CHARS,
        }
    }

    pub fn memory(&self) -> &Arc<dyn Memory> {
        &self.memory
    }

    /// Check the raw message and return it trimmed.
    ///
    /// The length limit applies to the message as sent; emptiness is judged
    /// after trimming.
    pub fn validate<'a>(&self, message: &'a str) -> Result<&'a str, ChatError> {
        let chars = message.chars().count();
        if chars > self.max_message_chars {
            return Err(ChatError::MessageTooLong {
                chars,
                max: self.max_message_chars,
            });
        }
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        Ok(trimmed)
    }

    /// Answer one request as a lazy stream of text fragments.
    ///
    /// Returns `Err` only for validation failures, before memory or the
    /// upstream has been touched.
    pub async fn respond(&self, request: ChatRequest) -> Result<ChatStream, ChatError> {
        let message = self.validate(&request.message)?.to_string();
        let session_id = request.session_id.filter(|id| !id.is_empty());

        let history = match &session_id {
            Some(id) => match self.memory.get_history(id).await {
                Ok(history) => history,
                Err(e) => {
                    warn!("History retrieval failed for session {id}: {e}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let prompt = build_prompt(&self.system_prompt, history, &message);
        debug!(
            "Prompt built: {} turns, session {}",
            prompt.len(),
            session_id.as_deref().unwrap_or("-")
        );

        let user_write = session_id.as_ref().map(|id| {
            tokio::spawn(persist(
                self.memory.clone(),
                id.clone(),
                Role::User,
                message,
            ))
        });

        let upstream = self.source.stream(prompt);
        let recorder = AssistantRecorder {
            memory: self.memory.clone(),
            session_id,
            user_write,
            text: String::new(),
        };
        Ok(relay(upstream, recorder))
    }
}

/// System instruction, then prior turns in order, then the new user turn.
pub fn build_prompt(system_prompt: &str, history: Vec<Turn>, message: &str) -> Vec<Turn> {
    let mut prompt = Vec::with_capacity(history.len() + 2);
    prompt.push(Turn::system(system_prompt));
    prompt.extend(history);
    prompt.push(Turn::user(message));
    prompt
}

/// Forward text deltas in order and stop at the first terminal event.
fn relay(mut upstream: EventStream, mut recorder: AssistantRecorder) -> ChatStream {
    Box::pin(async_stream::stream! {
        while let Some(event) = upstream.next().await {
            match event {
                StreamEvent::TextDelta(text) => {
                    if text.is_empty() {
                        continue;
                    }
                    recorder.text.push_str(&text);
                    yield text;
                }
                StreamEvent::Skipped(reason) => {
                    debug!("Skipping malformed upstream fragment: {reason}");
                }
                StreamEvent::Done => break,
                StreamEvent::Error(detail) => {
                    error!("Upstream stream failed: {detail}");
                    yield format!("{ERROR_TRAILER_PREFIX}{detail}");
                    break;
                }
            }
        }
        recorder.finish();
    })
}

/// Accumulates forwarded text and persists it exactly once, either when the
/// stream ends or when it is dropped early.
struct AssistantRecorder {
    memory: Arc<dyn Memory>,
    session_id: Option<String>,
    user_write: Option<JoinHandle<()>>,
    text: String,
}

impl AssistantRecorder {
    fn finish(&mut self) {
        let Some(session_id) = self.session_id.take() else {
            return;
        };
        let user_write = self.user_write.take();
        let text = std::mem::take(&mut self.text);
        if text.is_empty() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available; assistant turn for session {session_id} not stored");
            return;
        };
        let memory = self.memory.clone();
        runtime.spawn(async move {
            if let Some(user_write) = user_write
                && let Err(e) = user_write.await
            {
                error!("User turn task for session {session_id} failed: {e}");
            }
            persist(memory, session_id, Role::Assistant, text).await;
        });
    }
}

impl Drop for AssistantRecorder {
    fn drop(&mut self) {
        self.finish();
    }
}

async fn persist(memory: Arc<dyn Memory>, session_id: String, role: Role, content: String) {
    if let Err(e) = memory.add_message(&session_id, role, content).await {
        error!("Failed to store {role} turn for session {session_id}: {e}");
    }
}
