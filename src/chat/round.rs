// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Round buffer management
//!
//! A round is the text being assembled for one assistant message. Starting a
//! new round discards the prior buffer; the orchestration loop starts one
//! round per model sub-call.

use crate::markup::MarkupDetector;

/// Buffer for the assistant round currently being streamed.
#[derive(Debug, Default)]
pub struct RoundManager {
    buffer: String,
    rounds_started: usize,
}

impl RoundManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard the prior round's buffer and begin a fresh one
    pub fn start_new_round(&mut self) {
        self.buffer.clear();
        self.rounds_started += 1;
    }

    /// Replace the round's content wholesale
    pub fn update_content(&mut self, full: impl Into<String>) {
        self.buffer = full.into();
    }

    /// Append a streamed chunk to the round
    pub fn append_content(&mut self, extra: &str) {
        self.buffer.push_str(extra);
    }

    /// The round's content with markup preserved, for history
    pub fn raw_content(&self) -> &str {
        &self.buffer
    }

    /// The round's content with markup stripped, for display
    pub fn display_content(&self) -> String {
        MarkupDetector::new().strip_markup(&self.buffer)
    }

    /// How many rounds have been started
    pub fn rounds_started(&self) -> usize {
        self.rounds_started
    }
}
