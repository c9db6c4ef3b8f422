// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Message types for model interactions
//!
//! Defines the role/content message structure the engine exchanges with
//! model backends and appends to conversation history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ConversationConfig;

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique identifier for the message
    pub id: Uuid,

    /// Role of the message sender
    pub role: Role,

    /// Content of the message (may contain embedded tool markup)
    pub content: String,

    /// When the message was created
    pub timestamp: DateTime<Utc>,

    /// Estimated token count (if calculated)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
}

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// System prompt
    System,
    /// Tool result fed back into the model
    Tool,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            token_count: None,
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a tool result message
    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    /// Estimate the token count of this message using the configured
    /// characters-per-token heuristic.
    pub fn estimate_tokens(&self, config: &ConversationConfig) -> u32 {
        let chars_per_token = config.chars_per_token.max(1) as usize;
        (self.content.len() / chars_per_token).max(1) as u32
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// Estimate the token count of a whole history with the heuristic.
pub fn estimate_history_tokens(messages: &[ChatMessage], config: &ConversationConfig) -> u32 {
    messages.iter().map(|m| m.estimate_tokens(config)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        assert_eq!(ChatMessage::user("hi").role, Role::User);
        assert_eq!(ChatMessage::assistant("hi").role, Role::Assistant);
        assert_eq!(ChatMessage::system("hi").role, Role::System);
        assert_eq!(ChatMessage::tool("ok").role, Role::Tool);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!(Role::System.to_string(), "system");
        assert_eq!(Role::Tool.to_string(), "tool");
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&Role::Tool).unwrap();
        assert_eq!(json, "\"tool\"");
        let role: Role = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, Role::Assistant);
    }

    #[test]
    fn test_message_serialization_round_trip() {
        let message = ChatMessage::user("hello there");
        let json = serde_json::to_string(&message).unwrap();
        let parsed: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, message.id);
        assert_eq!(parsed.role, Role::User);
        assert_eq!(parsed.content, "hello there");
    }

    #[test]
    fn test_estimate_tokens() {
        let config = ConversationConfig::default();
        let message = ChatMessage::user("x".repeat(40));
        assert_eq!(message.estimate_tokens(&config), 10);

        // Short messages still count as at least one token
        let tiny = ChatMessage::user("a");
        assert_eq!(tiny.estimate_tokens(&config), 1);
    }

    #[test]
    fn test_estimate_history_tokens() {
        let config = ConversationConfig::default();
        let messages = vec![
            ChatMessage::user("x".repeat(40)),
            ChatMessage::assistant("y".repeat(80)),
        ];
        assert_eq!(estimate_history_tokens(&messages, &config), 30);
    }
}
