// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation orchestration
//!
//! The engine in this module drives the request, stream, detect, branch loop
//! against a streaming model backend.

pub mod context;
pub mod engine;
pub mod prompt;
pub mod round;
pub mod state;

pub use context::ConversationContext;
pub use engine::{
    ConversationEngine, NoopTurnObserver, TurnHandle, TurnObserver, TurnOutcome, TurnRequest,
};
pub use prompt::{DefaultPromptPreparer, PreparedPrompt, PromptPreparer};
pub use round::RoundManager;
pub use state::{ProcessingState, StateTracker};
