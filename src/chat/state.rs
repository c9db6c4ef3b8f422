// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Observable processing state machine
//!
//! The state and the streamed chunks are the only two outputs a presentation
//! layer needs. State is published through a watch channel; invalid
//! transition attempts are logged and ignored, never a panic.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Where a turn currently is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    /// No turn in flight, or a finished turn has been acknowledged
    Idle,
    /// Input accepted, before history preparation
    Processing,
    /// About to invoke the model stream
    Connecting,
    /// First streamed chunk has arrived
    Receiving,
    /// A tool batch is executing
    ExecutingTool,
    /// Tool results are being folded back into history
    ProcessingToolResult,
    /// Budget threshold fired; waiting on external summarization
    Summarizing,
    /// Terminal classification reached
    Completed,
    /// Unrecovered turn error
    Error,
}

fn is_legal(from: ProcessingState, to: ProcessingState) -> bool {
    use ProcessingState::*;
    if from == to {
        return true;
    }
    matches!(
        (from, to),
        (_, Idle)
            | (_, Error)
            | (Idle, Processing)
            | (Processing, Connecting)
            | (Connecting, Receiving)
            | (Connecting, Completed)
            | (Receiving, ExecutingTool)
            | (Receiving, Completed)
            | (Receiving, Summarizing)
            | (ExecutingTool, ProcessingToolResult)
            | (ProcessingToolResult, Connecting)
            | (ProcessingToolResult, Summarizing)
            | (Summarizing, Completed)
    )
}

/// Publishes state transitions to observers over a watch channel.
#[derive(Debug)]
pub struct StateTracker {
    tx: watch::Sender<ProcessingState>,
}

impl StateTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ProcessingState::Idle);
        Self { tx }
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<ProcessingState> {
        self.tx.subscribe()
    }

    /// The current state
    pub fn current(&self) -> ProcessingState {
        *self.tx.borrow()
    }

    /// Attempt a transition. Illegal transitions are ignored.
    pub fn transition(&self, to: ProcessingState) -> bool {
        let from = self.current();
        if !is_legal(from, to) {
            tracing::warn!(
                target: "colloquy.chat.state",
                ?from,
                ?to,
                "ignoring illegal state transition"
            );
            return false;
        }
        if from != to {
            tracing::debug!(
                target: "colloquy.chat.state",
                ?from,
                ?to,
                "state transition"
            );
            self.tx.send_replace(to);
        }
        true
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
