// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Scripted model client for tests
//!
//! Streams are queued ahead of time and popped per `send_message` call, so
//! tests can drive the full orchestration loop deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;

use crate::error::{ColloquyError, Result};
use crate::llm::client::{ChatRequest, ModelClient, ModelStream, StreamEvent, UsageReport};
use crate::llm::message::ChatMessage;

struct ScriptedStream {
    events: Vec<Result<StreamEvent>>,
    /// Suspend forever after the scripted events instead of ending
    hang_after: bool,
}

/// Scripted client: queued streams, call counters, request capture.
pub struct MockClient {
    name: String,
    streams: Mutex<VecDeque<Result<ScriptedStream>>>,
    send_calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
    /// When non-zero, returned from `estimate_tokens` instead of the heuristic
    estimate_override: AtomicU32,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            streams: Mutex::new(VecDeque::new()),
            send_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            estimate_override: AtomicU32::new(0),
        }
    }

    /// Queue a scripted stream of events
    pub fn push_stream(&self, events: Vec<Result<StreamEvent>>) {
        self.streams.lock().unwrap().push_back(Ok(ScriptedStream {
            events,
            hang_after: false,
        }));
    }

    /// Queue a stream that emits the scripted events and then never ends
    pub fn push_hanging_stream(&self, events: Vec<Result<StreamEvent>>) {
        self.streams.lock().unwrap().push_back(Ok(ScriptedStream {
            events,
            hang_after: true,
        }));
    }

    /// Queue a `send_message` failure
    pub fn push_error(&self, error: ColloquyError) {
        self.streams.lock().unwrap().push_back(Err(error));
    }

    /// Queue a well-formed response: one delta per chunk, usage, stream end
    pub fn push_text_response(&self, chunks: &[&str], usage: UsageReport) {
        let mut events: Vec<Result<StreamEvent>> = chunks
            .iter()
            .map(|chunk| Ok(StreamEvent::TextDelta(chunk.to_string())))
            .collect();
        events.push(Ok(StreamEvent::Usage(usage)));
        events.push(Ok(StreamEvent::StreamEnd));
        self.push_stream(events);
    }

    /// Force `estimate_tokens` to return a fixed value
    pub fn set_estimate(&self, tokens: u32) {
        self.estimate_override.store(tokens, Ordering::SeqCst);
    }

    pub fn send_call_count(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    /// Requests captured in call order
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelClient for MockClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_message(&self, request: ChatRequest) -> Result<ModelStream> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        let scripted = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ColloquyError::Internal("missing scripted stream".to_string()))
            })?;

        if scripted.hang_after {
            Ok(Box::pin(
                stream::iter(scripted.events).chain(stream::pending()),
            ))
        } else {
            Ok(Box::pin(stream::iter(scripted.events)))
        }
    }

    fn estimate_tokens(&self, messages: &[ChatMessage]) -> u32 {
        let forced = self.estimate_override.load(Ordering::SeqCst);
        if forced > 0 {
            return forced;
        }
        messages
            .iter()
            .map(|m| (m.content.len() / 4).max(1) as u32)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_scripted_stream_plays_back_in_order() {
        let client = MockClient::new();
        client.push_text_response(&["Hello ", "world"], UsageReport::default());

        let request = ChatRequest::new("default", vec![ChatMessage::user("Hi")]);
        let mut stream = client.send_message(request).await.unwrap();

        let mut text = String::new();
        let mut saw_end = false;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                StreamEvent::TextDelta(delta) => text.push_str(&delta),
                StreamEvent::Usage(_) => {}
                StreamEvent::StreamEnd => saw_end = true,
            }
        }
        assert_eq!(text, "Hello world");
        assert!(saw_end);
        assert_eq!(client.send_call_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_script_is_internal_error() {
        let client = MockClient::new();
        let request = ChatRequest::new("default", vec![ChatMessage::user("Hi")]);
        let error = client.send_message(request).await.err().unwrap();
        assert!(matches!(error, ColloquyError::Internal(_)));
    }

    #[tokio::test]
    async fn test_request_capture() {
        let client = MockClient::new();
        client.push_text_response(&["ok"], UsageReport::default());

        let request = ChatRequest::new("default", vec![ChatMessage::user("remember me")])
            .with_system("system text");
        client.send_message(request).await.unwrap();

        let captured = client.requests();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].system.as_deref(), Some("system text"));
        assert_eq!(captured[0].messages[0].content, "remember me");
    }

    #[test]
    fn test_estimate_override() {
        let client = MockClient::new();
        let messages = vec![ChatMessage::user("x".repeat(400))];
        assert_eq!(client.estimate_tokens(&messages), 100);

        client.set_estimate(850);
        assert_eq!(client.estimate_tokens(&messages), 850);
    }
}
