// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Token accounting
//!
//! Each turn owns a [`TokenAccountant`] that records per-call usage reports
//! and merges them into process-wide cumulative counters. Only the owning
//! turn writes through its accountant; callers never mutate totals directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::llm::client::UsageReport;

/// Token totals for one turn
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens
    pub input_tokens: u64,
    /// Input tokens served from cache
    pub cached_input_tokens: u64,
    /// Output tokens
    pub output_tokens: u64,
}

impl TokenUsage {
    /// All input tokens, cached included
    pub fn total_input(&self) -> u64 {
        self.input_tokens + self.cached_input_tokens
    }
}

/// Process-wide cumulative counters, shared across turns
#[derive(Debug, Default)]
pub struct CumulativeTotals {
    input: AtomicU64,
    output: AtomicU64,
}

impl CumulativeTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of (input, output) totals. Input includes cached tokens.
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.input.load(Ordering::SeqCst),
            self.output.load(Ordering::SeqCst),
        )
    }
}

/// Per-turn token accountant
#[derive(Debug)]
pub struct TokenAccountant {
    turn: TokenUsage,
    totals: Arc<CumulativeTotals>,
}

impl TokenAccountant {
    pub fn new(totals: Arc<CumulativeTotals>) -> Self {
        Self {
            turn: TokenUsage::default(),
            totals,
        }
    }

    /// Record usage from one model call
    pub fn record_usage(&mut self, report: &UsageReport) {
        self.turn.input_tokens += report.input_tokens as u64;
        self.turn.cached_input_tokens += report.cached_input_tokens as u64;
        self.turn.output_tokens += report.output_tokens as u64;

        self.totals.input.fetch_add(
            report.input_tokens as u64 + report.cached_input_tokens as u64,
            Ordering::SeqCst,
        );
        self.totals
            .output
            .fetch_add(report.output_tokens as u64, Ordering::SeqCst);

        tracing::debug!(
            target: "colloquy.tokens",
            input_tokens = report.input_tokens,
            cached_input_tokens = report.cached_input_tokens,
            output_tokens = report.output_tokens,
            turn_input = self.turn.input_tokens,
            turn_output = self.turn.output_tokens,
            "recorded model call usage"
        );
    }

    /// Totals for the current turn
    pub fn turn_totals(&self) -> TokenUsage {
        self.turn
    }

    /// Process-wide (input, output) totals, cached input included
    pub fn cumulative(&self) -> (u64, u64) {
        self.totals.snapshot()
    }

    /// Whether estimated usage has crossed the summarization threshold.
    ///
    /// `estimate` comes from the model client's cheap token estimate over
    /// the current history.
    pub fn should_trigger_summary(&self, max_tokens: u32, ratio: f32, estimate: u32) -> bool {
        if max_tokens == 0 {
            return false;
        }
        estimate as f64 / max_tokens as f64 >= ratio as f64
    }
}
