// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Utility functions for Colloquy

use tracing_subscriber::EnvFilter;

/// Initialize tracing with an env-filter subscriber.
///
/// Reads `RUST_LOG` when set, defaulting to `info`. Safe to call more than
/// once; repeated initialization is ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Truncate a string for log output, replacing newlines with spaces.
pub fn truncate_for_log(s: &str, max_len: usize) -> String {
    let flat = s.replace('\n', " ");
    if flat.chars().count() <= max_len {
        flat
    } else {
        let cut: String = flat.chars().take(max_len).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn test_truncate_for_log_short() {
        assert_eq!(truncate_for_log("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_for_log_long() {
        let out = truncate_for_log("hello world", 5);
        assert_eq!(out, "hello...");
    }

    #[test]
    fn test_truncate_for_log_newlines() {
        assert_eq!(truncate_for_log("a\nb\nc", 10), "a b c");
    }
}
