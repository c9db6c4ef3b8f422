// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Turn persistence
//!
//! The engine reports committed messages and per-turn token stats through
//! the [`PersistenceSink`] boundary. [`TurnLog`] is the provided
//! implementation: a JSON index of finished turns with quick recent-turn
//! listing.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::Result;
use crate::llm::message::{ChatMessage, Role};

/// Persistence boundary consumed by the engine.
pub trait PersistenceSink: Send + Sync {
    /// Record one committed message
    fn append_message(&self, message: &ChatMessage) -> Result<()>;

    /// Record a finished turn's token stats and history window size
    fn save_turn_stats(
        &self,
        input_tokens: u64,
        output_tokens: u64,
        window_size: usize,
    ) -> Result<()>;
}

/// Sink that discards everything, for callers without persistence.
#[derive(Debug, Default)]
pub struct NoopPersistenceSink;

impl PersistenceSink for NoopPersistenceSink {
    fn append_message(&self, _message: &ChatMessage) -> Result<()> {
        Ok(())
    }

    fn save_turn_stats(
        &self,
        _input_tokens: u64,
        _output_tokens: u64,
        _window_size: usize,
    ) -> Result<()> {
        Ok(())
    }
}

/// One finished turn in the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Turn ID
    pub id: Uuid,
    /// When the turn started
    pub started_at: DateTime<Utc>,
    /// When the stats were saved
    pub finished_at: DateTime<Utc>,
    /// Messages committed during the turn
    pub message_count: usize,
    /// First user message, truncated
    pub summary: Option<String>,
    /// Input tokens, cached included
    pub input_tokens: u64,
    /// Output tokens
    pub output_tokens: u64,
    /// History window size when the turn ended
    pub window_size: usize,
}

#[derive(Debug, Default)]
struct OpenTurn {
    started_at: Option<DateTime<Utc>>,
    message_count: usize,
    summary: Option<String>,
}

#[derive(Debug, Default)]
struct TurnLogState {
    turns: Vec<TurnRecord>,
    current: OpenTurn,
}

/// JSON-index turn log.
#[derive(Debug)]
pub struct TurnLog {
    index_path: PathBuf,
    state: Mutex<TurnLogState>,
}

impl TurnLog {
    /// Open or create the log at the default location
    pub fn open() -> Result<Self> {
        Self::open_at(Settings::colloquy_home().join("turns.json"))
    }

    /// Open or create a log at a specific path
    pub fn open_at(index_path: PathBuf) -> Result<Self> {
        let turns = if index_path.exists() {
            let content = std::fs::read_to_string(&index_path)?;
            serde_json::from_str(&content).unwrap_or_default()
        } else {
            Vec::new()
        };

        Ok(Self {
            index_path,
            state: Mutex::new(TurnLogState {
                turns,
                current: OpenTurn::default(),
            }),
        })
    }

    fn write_index(&self, turns: &[TurnRecord]) -> Result<()> {
        if let Some(parent) = self.index_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(turns)?;
        std::fs::write(&self.index_path, content)?;
        Ok(())
    }

    /// Number of finished turns in the log
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent turns, newest first
    pub fn list_recent(&self, limit: usize) -> Vec<TurnRecord> {
        let state = self.state.lock().unwrap();
        let mut sorted: Vec<TurnRecord> = state.turns.clone();
        sorted.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
        sorted.truncate(limit);
        sorted
    }
}

fn truncate_summary(text: &str) -> String {
    if text.chars().count() > 100 {
        let cut: String = text.chars().take(97).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

impl PersistenceSink for TurnLog {
    fn append_message(&self, message: &ChatMessage) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let current = &mut state.current;
        if current.started_at.is_none() {
            current.started_at = Some(Utc::now());
        }
        current.message_count += 1;
        if current.summary.is_none() && message.role == Role::User {
            current.summary = Some(truncate_summary(&message.content));
        }
        Ok(())
    }

    fn save_turn_stats(
        &self,
        input_tokens: u64,
        output_tokens: u64,
        window_size: usize,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let current = std::mem::take(&mut state.current);
        let now = Utc::now();
        state.turns.push(TurnRecord {
            id: Uuid::new_v4(),
            started_at: current.started_at.unwrap_or(now),
            finished_at: now,
            message_count: current.message_count,
            summary: current.summary,
            input_tokens,
            output_tokens,
            window_size,
        });
        self.write_index(&state.turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_in(dir: &tempfile::TempDir) -> TurnLog {
        TurnLog::open_at(dir.path().join("turns.json")).unwrap()
    }

    #[test]
    fn test_turn_records_message_count_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);

        log.append_message(&ChatMessage::user("first question")).unwrap();
        log.append_message(&ChatMessage::assistant("an answer")).unwrap();
        log.save_turn_stats(120, 45, 2).unwrap();

        let recent = log.list_recent(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message_count, 2);
        assert_eq!(recent[0].summary.as_deref(), Some("first question"));
        assert_eq!(recent[0].input_tokens, 120);
        assert_eq!(recent[0].output_tokens, 45);
        assert_eq!(recent[0].window_size, 2);
    }

    #[test]
    fn test_index_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let log = log_in(&dir);
            log.append_message(&ChatMessage::user("persisted?")).unwrap();
            log.save_turn_stats(10, 5, 1).unwrap();
        }

        let reopened = log_in(&dir);
        assert_eq!(reopened.len(), 1);
        assert_eq!(
            reopened.list_recent(1)[0].summary.as_deref(),
            Some("persisted?")
        );
    }

    #[test]
    fn test_save_resets_the_open_turn() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);

        log.append_message(&ChatMessage::user("turn one")).unwrap();
        log.save_turn_stats(1, 1, 1).unwrap();
        log.append_message(&ChatMessage::user("turn two")).unwrap();
        log.append_message(&ChatMessage::assistant("reply")).unwrap();
        log.save_turn_stats(2, 2, 2).unwrap();

        let recent = log.list_recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].summary.as_deref(), Some("turn two"));
        assert_eq!(recent[0].message_count, 2);
    }

    #[test]
    fn test_long_summaries_are_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);

        log.append_message(&ChatMessage::user("x".repeat(300))).unwrap();
        log.save_turn_stats(0, 0, 1).unwrap();

        let summary = log.list_recent(1)[0].summary.clone().unwrap();
        assert_eq!(summary.chars().count(), 100);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn test_noop_sink_accepts_everything() {
        let sink = NoopPersistenceSink;
        sink.append_message(&ChatMessage::user("hi")).unwrap();
        sink.save_turn_stats(1, 2, 3).unwrap();
    }
}
