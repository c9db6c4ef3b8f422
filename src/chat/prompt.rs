// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Prompt preparation
//!
//! Builds the outgoing history for a model call: system prompt, capability
//! descriptors, prior messages, and the new user message. Pure from the
//! engine's perspective.

use crate::llm::message::ChatMessage;
use crate::tools::ToolDescriptor;

/// A prepared model call: system prompt plus ordered messages
#[derive(Debug, Clone)]
pub struct PreparedPrompt {
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

/// Injects system prompt and capability descriptors ahead of a model call.
pub trait PromptPreparer: Send + Sync {
    fn prepare(
        &self,
        history: &[ChatMessage],
        input: &ChatMessage,
        system_override: Option<&str>,
        tools: &[ToolDescriptor],
    ) -> PreparedPrompt;
}

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a capable assistant in a multi-turn conversation.

To run a tool, emit a block of the form:
<tool name=\"TOOL\"><param name=\"KEY\">VALUE</param></tool>
Tool results arrive as tool-role messages in the next exchange.

Emit <done/> when the task is finished. Emit <wait/> when you need more \
input from the user. Never combine <done/> with tool calls.";

/// Default preparer: protocol description plus rendered tool descriptors.
#[derive(Debug, Default)]
pub struct DefaultPromptPreparer;

impl DefaultPromptPreparer {
    pub fn new() -> Self {
        Self
    }

    fn render_tools(tools: &[ToolDescriptor]) -> String {
        if tools.is_empty() {
            return String::new();
        }
        let mut out = String::from("\n\nAvailable tools:\n");
        for tool in tools {
            out.push_str(&format!("- {}: {}\n", tool.name, tool.description));
            for (param, description) in &tool.parameters {
                out.push_str(&format!("  - {}: {}\n", param, description));
            }
        }
        out
    }
}

impl PromptPreparer for DefaultPromptPreparer {
    fn prepare(
        &self,
        history: &[ChatMessage],
        input: &ChatMessage,
        system_override: Option<&str>,
        tools: &[ToolDescriptor],
    ) -> PreparedPrompt {
        let mut system = system_override.unwrap_or(DEFAULT_SYSTEM_PROMPT).to_string();
        system.push_str(&Self::render_tools(tools));

        let mut messages = history.to_vec();
        messages.push(input.clone());

        PreparedPrompt { system, messages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: format!("{} description", name),
            parameters: vec![("path".to_string(), "target path".to_string())],
        }
    }

    #[test]
    fn test_default_system_prompt_names_the_protocol() {
        let preparer = DefaultPromptPreparer::new();
        let prepared = preparer.prepare(&[], &ChatMessage::user("hi"), None, &[]);
        assert!(prepared.system.contains("<tool name="));
        assert!(prepared.system.contains("<done/>"));
        assert!(prepared.system.contains("<wait/>"));
    }

    #[test]
    fn test_override_replaces_base_prompt() {
        let preparer = DefaultPromptPreparer::new();
        let prepared = preparer.prepare(
            &[],
            &ChatMessage::user("hi"),
            Some("Short and custom."),
            &[],
        );
        assert!(prepared.system.starts_with("Short and custom."));
        assert!(!prepared.system.contains("capable assistant"));
    }

    #[test]
    fn test_tools_are_rendered_into_system_prompt() {
        let preparer = DefaultPromptPreparer::new();
        let prepared = preparer.prepare(
            &[],
            &ChatMessage::user("hi"),
            None,
            &[descriptor("file_read")],
        );
        assert!(prepared.system.contains("file_read: file_read description"));
        assert!(prepared.system.contains("path: target path"));
    }

    #[test]
    fn test_messages_are_history_plus_input() {
        let preparer = DefaultPromptPreparer::new();
        let history = vec![ChatMessage::user("first"), ChatMessage::assistant("reply")];
        let input = ChatMessage::user("second");
        let prepared = preparer.prepare(&history, &input, None, &[]);

        assert_eq!(prepared.messages.len(), 3);
        assert_eq!(prepared.messages[2].content, "second");
        // Pure: inputs are untouched
        assert_eq!(history.len(), 2);
    }
}
