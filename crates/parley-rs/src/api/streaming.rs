//! Server-Sent Events (SSE) decoding for chat-completion streams.
//!
//! Upstream bodies arrive as arbitrary byte chunks. [`SseDecoder`] buffers
//! them, splits complete lines, and turns each `data:` payload into a
//! [`StreamEvent`]. Bytes are only decoded once a full line is available, so
//! a multi-byte character split across two chunks survives intact.

use serde::Deserialize;
use tracing::trace;

/// A single event from an upstream completion stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// An incremental text content delta.
    TextDelta(String),
    /// A payload that could not be parsed. The stream carries on.
    Skipped(String),
    /// The stream is complete.
    Done,
    /// The upstream call failed. Nothing follows this event.
    Error(String),
}

/// Raw SSE data chunk from an OpenAI-compatible completions API.
#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    /// Set when the upstream fails after the response has started.
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
}

/// Parse a single SSE `data:` payload.
///
/// An `error` object becomes [`StreamEvent::Error`] carrying its `message`,
/// or the whole object when it has none. Otherwise only the first choice is
/// read. Chunks without choices, without a delta, or with empty content
/// produce no event; those are routine (role headers, content-filter
/// annotations, the final `finish_reason` chunk).
pub fn parse_sse_data(data: &str) -> Option<StreamEvent> {
    let chunk = match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => return Some(StreamEvent::Skipped(format!("{e}: {data}"))),
    };

    if let Some(error) = chunk.error {
        let detail = match error.get("message").and_then(|m| m.as_str()) {
            Some(message) => message.to_string(),
            None => error.to_string(),
        };
        return Some(StreamEvent::Error(detail));
    }

    let choice = chunk.choices.into_iter().next()?;
    if let Some(reason) = &choice.finish_reason {
        trace!("Stream finish_reason: {reason}");
    }
    choice
        .delta?
        .content
        .filter(|content| !content.is_empty())
        .map(StreamEvent::TextDelta)
}

/// Incremental line decoder for an SSE body.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `data: [DONE]`, an error event, or [`finish`](Self::finish)
    /// has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one chunk of body bytes and return the events from every line it
    /// completed. Input after the terminator is ignored.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        self.buffer.extend_from_slice(bytes);

        while !self.done
            && let Some(newline) = self.buffer.iter().position(|b| *b == b'\n')
        {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.decode_line(&String::from_utf8_lossy(&line), &mut events);
        }
        events
    }

    /// Flush a trailing unterminated line and close the stream.
    ///
    /// A body that ends without `[DONE]` still counts as a completed stream,
    /// so this always ends with [`StreamEvent::Done`] unless one was already
    /// emitted.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        let rest = std::mem::take(&mut self.buffer);
        self.decode_line(&String::from_utf8_lossy(&rest), &mut events);
        if !self.done {
            self.done = true;
            events.push(StreamEvent::Done);
        }
        events
    }

    fn decode_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) {
        let line = line.trim();
        // Blank lines separate events; `:` lines are keep-alive comments.
        if line.is_empty() || line.starts_with(':') {
            return;
        }
        // `event:`, `id:` and `retry:` fields carry nothing we use.
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim_start();
        if data == "[DONE]" {
            self.done = true;
            events.push(StreamEvent::Done);
            return;
        }
        match parse_sse_data(data) {
            Some(event @ StreamEvent::Error(_)) => {
                self.done = true;
                events.push(event);
            }
            Some(event) => events.push(event),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> StreamEvent {
        StreamEvent::TextDelta(s.into())
    }

    #[test]
    fn parses_content_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        assert_eq!(parse_sse_data(data), Some(text("Hello")));
    }

    #[test]
    fn chunks_without_text_yield_nothing() {
        // Content-filter preamble with no choices.
        assert_eq!(parse_sse_data(r#"{"choices":[],"prompt_filter_results":[]}"#), None);
        // Role header.
        assert_eq!(
            parse_sse_data(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#),
            None
        );
        // Empty content.
        assert_eq!(
            parse_sse_data(r#"{"choices":[{"delta":{"content":""}}]}"#),
            None
        );
        // Final chunk.
        assert_eq!(
            parse_sse_data(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
            None
        );
        // No choices key at all.
        assert_eq!(parse_sse_data(r#"{"id":"x"}"#), None);
    }

    #[test]
    fn malformed_payload_is_skipped() {
        let event = parse_sse_data("{not json");
        assert!(matches!(event, Some(StreamEvent::Skipped(reason)) if reason.contains("{not json")));
    }

    #[test]
    fn decoder_handles_a_full_body() {
        let body = concat!(
            ": keep-alive\n",
            "\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
            "\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n",
            "\n",
            "data: [DONE]\n",
            "\n",
        );
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(body.as_bytes());
        assert_eq!(events, vec![text("Hel"), text("lo"), StreamEvent::Done]);
        assert!(decoder.is_done());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn decoder_reassembles_lines_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"choices\":[{\"del").is_empty());
        let events = decoder.feed(b"ta\":{\"content\":\"ok\"}}]}\n\n");
        assert_eq!(events, vec![text("ok")]);
    }

    #[test]
    fn decoder_keeps_multibyte_characters_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo\"}}]}\n";
        let bytes = line.as_bytes();
        // Split inside the two-byte 'é'.
        let split = line.find('é').unwrap() + 1;

        let mut decoder = SseDecoder::new();
        let mut events = decoder.feed(&bytes[..split]);
        events.extend(decoder.feed(&bytes[split..]));
        assert_eq!(events, vec![text("héllo")]);
    }

    #[test]
    fn decoder_skips_bad_lines_and_continues() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: garbage\n",
            "event: ping\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
        );
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(body.as_bytes());
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], text("a"));
        assert!(matches!(events[1], StreamEvent::Skipped(_)));
        assert_eq!(events[2], text("b"));
    }

    #[test]
    fn error_payload_becomes_an_error_event() {
        let data = r#"{"error":{"message":"The server had an error","type":"server_error"}}"#;
        assert_eq!(
            parse_sse_data(data),
            Some(StreamEvent::Error("The server had an error".into()))
        );
    }

    #[test]
    fn error_payload_without_message_keeps_the_raw_object() {
        let event = parse_sse_data(r#"{"error":{"code":"429"}}"#);
        assert_eq!(event, Some(StreamEvent::Error(r#"{"code":"429"}"#.into())));
    }

    #[test]
    fn decoder_stops_at_an_error_event() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n",
            "\n",
            "data: {\"error\":{\"message\":\"The server had an error\",\"type\":\"server_error\"}}\n",
            "\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
        );
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(body.as_bytes());
        assert_eq!(
            events,
            vec![
                text("par"),
                StreamEvent::Error("The server had an error".into())
            ]
        );
        assert!(decoder.is_done());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn decoder_ignores_input_after_done() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(
            b"data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
        );
        assert_eq!(events, vec![StreamEvent::Done]);
        assert!(decoder.feed(b"data: {\"choices\":[]}\n").is_empty());
    }

    #[test]
    fn finish_flushes_unterminated_line_and_appends_done() {
        let mut decoder = SseDecoder::new();
        assert!(
            decoder
                .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}")
                .is_empty()
        );
        assert_eq!(decoder.finish(), vec![text("tail"), StreamEvent::Done]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn data_prefix_without_space_is_accepted() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data:{\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\ndata:[DONE]\n");
        assert_eq!(events, vec![text("x"), StreamEvent::Done]);
    }
}
