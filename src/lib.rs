// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Colloquy — streaming conversation orchestration engine
//!
//! Drives multi-turn exchanges with a streaming language-model backend:
//! ingests incrementally produced text, detects embedded tool-call and
//! completion markup, executes tools through an injected capability, feeds
//! results back to the model, tracks token budgets, and decides when a turn
//! is finished.
//!
//! The entry point is [`chat::ConversationEngine`]; backends implement
//! [`llm::ModelClient`] and tool hosts implement [`tools::ToolCapability`].

pub mod cancel;
pub mod chat;
pub mod config;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod llm;
pub mod markup;
pub mod tokens;
pub mod tools;
pub mod utils;

pub use error::{ApiError, ColloquyError, Result};

pub use chat::{
    ConversationEngine, NoopTurnObserver, ProcessingState, TurnHandle, TurnObserver, TurnOutcome,
    TurnRequest,
};
