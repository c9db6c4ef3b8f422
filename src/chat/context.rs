// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-call conversation context
//!
//! One context is created per `send_message` call and destroyed when the
//! call's stream completes or is cancelled. Contexts are never shared across
//! concurrent calls; every mutable piece of turn state lives here.

use uuid::Uuid;

use crate::cancel::CancelSignal;
use crate::chat::round::RoundManager;
use crate::llm::message::ChatMessage;

/// State owned by one `send_message` call.
#[derive(Debug)]
pub struct ConversationContext {
    /// Context id, used for log correlation
    pub id: Uuid,
    stream_buffer: String,
    round: RoundManager,
    history: Vec<ChatMessage>,
    /// History length at context creation; everything past it is this turn's
    baseline_len: usize,
    active: bool,
    cancel: CancelSignal,
}

impl ConversationContext {
    pub fn new(history: Vec<ChatMessage>, cancel: CancelSignal) -> Self {
        let baseline_len = history.len();
        Self {
            id: Uuid::new_v4(),
            stream_buffer: String::new(),
            round: RoundManager::new(),
            history,
            baseline_len,
            active: true,
            cancel,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Mark the context inactive. Idempotent: returns `true` only for the
    /// call that performed the transition.
    pub fn finalize(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        tracing::debug!(
            target: "colloquy.chat.context",
            context_id = %self.id,
            appended_messages = self.history.len() - self.baseline_len,
            "context finalized"
        );
        true
    }

    /// Begin a fresh assistant round
    pub fn start_new_round(&mut self) {
        self.round.start_new_round();
    }

    /// Buffer a streamed chunk into both the turn transcript and the round
    pub fn buffer_chunk(&mut self, chunk: &str) {
        self.stream_buffer.push_str(chunk);
        self.round.append_content(chunk);
    }

    /// Raw content of the current round
    pub fn round_raw(&self) -> &str {
        self.round.raw_content()
    }

    /// Display content of the current round
    pub fn round_display(&self) -> String {
        self.round.display_content()
    }

    pub fn round(&mut self) -> &mut RoundManager {
        &mut self.round
    }

    /// Everything streamed during this turn, all rounds concatenated
    pub fn stream_buffer(&self) -> &str {
        &self.stream_buffer
    }

    /// The working history, prior messages included
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Append a message to the working history. Append-only within a turn.
    pub fn push_message(&mut self, message: ChatMessage) {
        self.history.push(message);
    }

    /// Messages appended during this turn
    pub fn new_messages(&self) -> &[ChatMessage] {
        &self.history[self.baseline_len..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with(messages: Vec<ChatMessage>) -> ConversationContext {
        ConversationContext::new(messages, CancelSignal::new())
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut ctx = context_with(vec![]);
        assert!(ctx.is_active());
        assert!(ctx.finalize());
        assert!(!ctx.finalize());
        assert!(!ctx.finalize());
        assert!(!ctx.is_active());
    }

    #[test]
    fn test_new_messages_tracks_turn_additions() {
        let mut ctx = context_with(vec![ChatMessage::user("earlier")]);
        assert!(ctx.new_messages().is_empty());

        ctx.push_message(ChatMessage::user("now"));
        ctx.push_message(ChatMessage::assistant("reply"));

        assert_eq!(ctx.new_messages().len(), 2);
        assert_eq!(ctx.history().len(), 3);
    }

    #[test]
    fn test_buffer_chunk_feeds_round_and_transcript() {
        let mut ctx = context_with(vec![]);
        ctx.start_new_round();
        ctx.buffer_chunk("one ");
        ctx.buffer_chunk("two");

        assert_eq!(ctx.round_raw(), "one two");
        assert_eq!(ctx.stream_buffer(), "one two");

        // A new round resets the round buffer, not the transcript
        ctx.start_new_round();
        ctx.buffer_chunk("three");
        assert_eq!(ctx.round_raw(), "three");
        assert_eq!(ctx.stream_buffer(), "one twothree");
    }

    #[test]
    fn test_contexts_are_isolated() {
        let mut first = context_with(vec![]);
        let mut second = context_with(vec![]);

        first.start_new_round();
        first.buffer_chunk("only in first");
        second.start_new_round();

        assert_eq!(first.round_raw(), "only in first");
        assert_eq!(second.round_raw(), "");
        assert_ne!(first.id, second.id);
    }
}
