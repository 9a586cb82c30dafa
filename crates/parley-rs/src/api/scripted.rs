//! In-process completion source that replays canned events.
//!
//! Useful anywhere a real upstream is unwanted: unit tests, server
//! integration tests, and offline demos. Each call to
//! [`stream`](CompletionSource::stream) pops the next queued reply; once the
//! queue is empty the fallback reply is used.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{CompletionSource, EventStream, StreamEvent};
use crate::Turn;

#[derive(Debug, Default)]
pub struct ScriptedSource {
    replies: Mutex<VecDeque<Vec<StreamEvent>>>,
    fallback: Vec<StreamEvent>,
    prompts: Mutex<Vec<Vec<Turn>>>,
    delay: Option<Duration>,
}

impl ScriptedSource {
    /// A source that answers every prompt with `events`.
    pub fn new(events: Vec<StreamEvent>) -> Self {
        Self {
            fallback: events,
            ..Self::default()
        }
    }

    /// A source that answers every prompt with the given text fragments
    /// followed by [`StreamEvent::Done`].
    pub fn replying<S: AsRef<str>>(fragments: &[S]) -> Self {
        Self::new(text_reply(fragments))
    }

    /// Queue a reply to be used once, ahead of the fallback.
    pub fn then(self, events: Vec<StreamEvent>) -> Self {
        lock(&self.replies).push_back(events);
        self
    }

    /// Sleep for `delay` after every emitted event.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<Vec<Turn>> {
        lock(&self.prompts).clone()
    }
}

/// Text fragments followed by [`StreamEvent::Done`].
pub fn text_reply<S: AsRef<str>>(fragments: &[S]) -> Vec<StreamEvent> {
    fragments
        .iter()
        .map(|f| StreamEvent::TextDelta(f.as_ref().to_string()))
        .chain(std::iter::once(StreamEvent::Done))
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CompletionSource for ScriptedSource {
    fn stream(&self, turns: Vec<Turn>) -> EventStream {
        lock(&self.prompts).push(turns);
        let events = lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let delay = self.delay;

        Box::pin(async_stream::stream! {
            for event in events {
                yield event;
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn queued_replies_come_before_the_fallback() {
        let source = ScriptedSource::replying(&["default"]).then(text_reply(&["first"]));

        let first: Vec<StreamEvent> = source.stream(vec![Turn::user("1")]).collect().await;
        let second: Vec<StreamEvent> = source.stream(vec![Turn::user("2")]).collect().await;

        assert_eq!(first[0], StreamEvent::TextDelta("first".into()));
        assert_eq!(second[0], StreamEvent::TextDelta("default".into()));
        assert_eq!(second.last(), Some(&StreamEvent::Done));
    }

    #[tokio::test]
    async fn records_prompts_in_order() {
        let source = ScriptedSource::replying(&["ok"]);
        drop(source.stream(vec![Turn::user("a")]));
        drop(source.stream(vec![Turn::user("b")]));

        let prompts = source.prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[1], vec![Turn::user("b")]);
    }
}
