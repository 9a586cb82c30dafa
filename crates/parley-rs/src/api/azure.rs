//! Azure OpenAI chat-completions client.

use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tracing::debug;

use super::{CompletionSource, EventStream, SseDecoder, StreamEvent, UpstreamError};
use crate::Turn;
use crate::config::UpstreamSettings;

/// Sampling temperature sent with every request.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Cap on generated tokens per reply.
pub const DEFAULT_MAX_TOKENS: u32 = 700;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize, Debug)]
struct CompletionRequest<'a> {
    messages: &'a [Turn],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// Streaming client for one Azure OpenAI deployment.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone, Debug)]
pub struct AzureOpenAiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    deployment: String,
    api_version: String,
    temperature: f32,
    max_tokens: u32,
}

impl AzureOpenAiClient {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(UpstreamError::Client)?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            deployment: settings.model.clone(),
            api_version: settings.api_version.clone(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    /// Full chat-completions URL for the configured deployment.
    pub fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.deployment,
            self.api_version
        )
    }
}

impl CompletionSource for AzureOpenAiClient {
    fn stream(&self, turns: Vec<Turn>) -> EventStream {
        let this = self.clone();

        Box::pin(async_stream::stream! {
            let body = CompletionRequest {
                messages: &turns,
                temperature: this.temperature,
                max_tokens: this.max_tokens,
                stream: true,
            };

            debug!("Sending streaming chat request ({} turns)", turns.len());

            let response = match this
                .client
                .post(this.completions_url())
                .header("api-key", &this.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    yield StreamEvent::Error(
                        UpstreamError::Transport(format!("request failed: {e}")).to_string(),
                    );
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                yield StreamEvent::Error(
                    UpstreamError::Http { status: status.as_u16(), body: detail }.to_string(),
                );
                return;
            }

            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield StreamEvent::Error(
                            UpstreamError::Transport(format!("failed to read stream: {e}"))
                                .to_string(),
                        );
                        return;
                    }
                };
                for event in decoder.feed(&chunk) {
                    yield event;
                }
                if decoder.is_done() {
                    break;
                }
            }

            for event in decoder.finish() {
                yield event;
            }
            debug!("Upstream stream completed");
        })
    }
}
