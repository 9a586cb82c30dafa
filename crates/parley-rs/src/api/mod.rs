//! Upstream completion layer.
//!
//! - [`CompletionSource`]: the seam the chat orchestrator streams from.
//! - [`azure`]: [`AzureOpenAiClient`], the production source, speaking the
//!   Azure OpenAI chat-completions API over SSE.
//! - [`streaming`]: SSE decoding into [`StreamEvent`] values.
//! - [`scripted`]: [`ScriptedSource`], an in-process source that replays
//!   canned events and records the prompts it was given.

pub mod azure;
pub mod scripted;
pub mod streaming;

use std::pin::Pin;

use futures::Stream;
use thiserror::Error;

use crate::Turn;

pub use azure::AzureOpenAiClient;
pub use scripted::ScriptedSource;
pub use streaming::{SseDecoder, StreamEvent};

/// Boxed stream of upstream events.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Something that can stream a completion for a prompt.
///
/// `stream` must be lazy: no request is made until the returned stream is
/// first polled. A failed call is reported as a single
/// [`StreamEvent::Error`] after which the stream ends.
pub trait CompletionSource: Send + Sync {
    fn stream(&self, turns: Vec<Turn>) -> EventStream;
}

/// Errors from talking to the upstream completion API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// The upstream answered with a non-success status.
    #[error("upstream HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// The request could not be sent or the body could not be read.
    #[error("{0}")]
    Transport(String),
}
