// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Model client trait and related types
//!
//! Defines the abstraction layer for streaming model backends. Transport
//! details are out of scope; the engine only drives this interface.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;
use crate::llm::message::ChatMessage;

/// A live response stream from a model backend.
///
/// Dropping the stream cancels the in-flight request.
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Main trait for model backends
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Get the backend name (e.g., "primary", "local")
    fn name(&self) -> &str;

    /// Start a streaming completion for the prepared request
    async fn send_message(&self, request: ChatRequest) -> Result<ModelStream>;

    /// Cheap token estimate for a history, used for budget checks
    fn estimate_tokens(&self, messages: &[ChatMessage]) -> u32;
}

/// Request for a streaming completion
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model to use
    pub model: String,

    /// Messages in the conversation
    pub messages: Vec<ChatMessage>,

    /// System prompt
    pub system: Option<String>,

    /// Maximum tokens in response
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,
}

impl ChatRequest {
    /// Create a new request
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            system: None,
            max_tokens: 8192,
            temperature: 0.7,
        }
    }

    /// Set the system prompt
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Events from a streaming response
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental text produced by the model
    TextDelta(String),

    /// Token usage for the call, reported once near the end of the stream
    Usage(UsageReport),

    /// End of the response
    StreamEnd,
}

/// Token usage for one model call
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageReport {
    /// Input tokens
    pub input_tokens: u32,
    /// Input tokens served from cache
    #[serde(default)]
    pub cached_input_tokens: u32,
    /// Output tokens
    pub output_tokens: u32,
}

impl UsageReport {
    /// Get total tokens used
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}
