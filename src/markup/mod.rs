// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Markup detection for assistant rounds
//!
//! Model output embeds tool invocations and turn markers as inline markup:
//!
//! ```text
//! <tool name="file_read"> <param name="path">notes.txt</param> </tool>
//! <done/>
//! <wait/>
//! ```
//!
//! Primary extraction is strict pattern matching over this schema. Streams
//! sometimes carry malformed markup (irregular spacing, stray quote styles),
//! so a tolerant second pass re-segments the text and normalizes tool-shaped
//! tags before re-attempting strict extraction; see [`normalize`].

pub mod normalize;

use std::sync::OnceLock;

use regex::Regex;

use crate::tools::ToolInvocation;

struct Patterns {
    tool_block: Regex,
    param: Regex,
    done: Regex,
    wait: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        tool_block: Regex::new(r#"(?s)<tool name="([^"]+)">(.*?)</tool>"#)
            .expect("tool block pattern"),
        param: Regex::new(r#"(?s)<param name="([^"]+)">(.*?)</param>"#).expect("param pattern"),
        done: Regex::new(r"<done\s*/>").expect("done pattern"),
        wait: Regex::new(r"<wait\s*/>").expect("wait pattern"),
    })
}

/// What a finished round contains
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundClassification {
    /// Tool invocations in order of appearance
    pub invocations: Vec<ToolInvocation>,
    /// The round carries a completion marker
    pub has_completion_marker: bool,
    /// The round carries a wait-for-user marker
    pub has_wait_marker: bool,
}

impl RoundClassification {
    /// Neither markers nor invocations
    pub fn is_plain(&self) -> bool {
        self.invocations.is_empty() && !self.has_completion_marker && !self.has_wait_marker
    }
}

/// Scans finished round text for tool invocations and turn markers.
#[derive(Debug, Default)]
pub struct MarkupDetector;

impl MarkupDetector {
    pub fn new() -> Self {
        Self
    }

    /// Classify a finished round.
    ///
    /// Pure: the same text always yields the same classification. When the
    /// strict pass finds no invocation but angle-bracket runs are present,
    /// the tolerant normalization pass runs and extraction is re-attempted
    /// on its output.
    pub fn classify(&self, round_text: &str) -> RoundClassification {
        let classification = extract(round_text);
        if !classification.invocations.is_empty() || !round_text.contains('<') {
            return classification;
        }

        match normalize::normalize_markup(round_text) {
            Some(normalized) => {
                let recovered = extract(&normalized);
                if recovered != classification {
                    tracing::debug!(
                        target: "colloquy.markup",
                        recovered_invocations = recovered.invocations.len(),
                        "tolerant pass recovered markup from malformed round"
                    );
                }
                recovered
            }
            None => classification,
        }
    }

    /// Remove tool blocks and turn markers, leaving human-readable text.
    pub fn strip_markup(&self, text: &str) -> String {
        let p = patterns();
        let stripped = p.tool_block.replace_all(text, "");
        let stripped = p.param.replace_all(&stripped, "");
        let stripped = p.done.replace_all(&stripped, "");
        let stripped = p.wait.replace_all(&stripped, "");
        stripped.trim().to_string()
    }
}

fn extract(text: &str) -> RoundClassification {
    let p = patterns();

    let invocations = p
        .tool_block
        .captures_iter(text)
        .map(|block| {
            let name = block[1].to_string();
            let params = p
                .param
                .captures_iter(&block[2])
                .map(|param| (param[1].to_string(), param[2].to_string()))
                .collect();
            ToolInvocation::new(name, params)
        })
        .collect();

    RoundClassification {
        invocations,
        has_completion_marker: p.done.is_match(text),
        has_wait_marker: p.wait.is_match(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_has_no_markup() {
        let detector = MarkupDetector::new();
        let classification = detector.classify("Just a friendly answer.");
        assert!(classification.is_plain());
    }

    #[test]
    fn test_extracts_single_tool_block() {
        let detector = MarkupDetector::new();
        let text = r#"Let me check. <tool name="file_read"><param name="path">notes.txt</param></tool>"#;
        let classification = detector.classify(text);

        assert_eq!(classification.invocations.len(), 1);
        let invocation = &classification.invocations[0];
        assert_eq!(invocation.name, "file_read");
        assert_eq!(invocation.param("path"), Some("notes.txt"));
        assert!(!classification.has_completion_marker);
        assert!(!classification.has_wait_marker);
    }

    #[test]
    fn test_extracts_multiple_tool_blocks_in_order() {
        let detector = MarkupDetector::new();
        let text = concat!(
            r#"<tool name="glob"><param name="pattern">*.rs</param></tool>"#,
            " and then ",
            r#"<tool name="grep"><param name="pattern">fn main</param></tool>"#,
        );
        let classification = detector.classify(text);

        let names: Vec<&str> = classification
            .invocations
            .iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(names, vec!["glob", "grep"]);
    }

    #[test]
    fn test_multiline_param_values() {
        let detector = MarkupDetector::new();
        let text = "<tool name=\"file_write\"><param name=\"content\">line one\nline two</param></tool>";
        let classification = detector.classify(text);
        assert_eq!(
            classification.invocations[0].param("content"),
            Some("line one\nline two")
        );
    }

    #[test]
    fn test_detects_markers() {
        let detector = MarkupDetector::new();
        assert!(detector.classify("All set. <done/>").has_completion_marker);
        assert!(detector.classify("All set. <done />").has_completion_marker);
        assert!(detector.classify("Your move. <wait/>").has_wait_marker);
        assert!(detector.classify("Your move. <wait />").has_wait_marker);
    }

    #[test]
    fn test_marker_and_tools_both_reported() {
        let detector = MarkupDetector::new();
        let text = r#"<tool name="shell"><param name="command">ls</param></tool> <done/>"#;
        let classification = detector.classify(text);
        assert_eq!(classification.invocations.len(), 1);
        assert!(classification.has_completion_marker);
    }

    #[test]
    fn test_classify_is_idempotent() {
        let detector = MarkupDetector::new();
        let text = r#"Look: <tool name = 'shell'><param name="command">ls</param></tool>"#;
        let first = detector.classify(text);
        let second = detector.classify(text);
        assert_eq!(first, second);
    }

    #[test]
    fn test_tolerant_pass_recovers_irregular_spacing() {
        let detector = MarkupDetector::new();
        let text = r#"<tool name = "shell"><param  name ="command">echo hi</param></tool>"#;
        let classification = detector.classify(text);
        assert_eq!(classification.invocations.len(), 1);
        assert_eq!(classification.invocations[0].name, "shell");
        assert_eq!(
            classification.invocations[0].param("command"),
            Some("echo hi")
        );
    }

    #[test]
    fn test_tolerant_pass_recovers_single_quotes() {
        let detector = MarkupDetector::new();
        let text = r#"<tool name='file_read'><param name='path'>a.txt</param></tool>"#;
        let classification = detector.classify(text);
        assert_eq!(classification.invocations.len(), 1);
        assert_eq!(classification.invocations[0].param("path"), Some("a.txt"));
    }

    #[test]
    fn test_angle_brackets_in_prose_stay_unclassified() {
        let detector = MarkupDetector::new();
        let classification = detector.classify("Use x < y and y > z in the proof.");
        assert!(classification.is_plain());
    }

    #[test]
    fn test_strip_markup_removes_blocks_and_markers() {
        let detector = MarkupDetector::new();
        let text = r#"Running it now.
<tool name="shell"><param name="command">ls</param></tool>
<done/>"#;
        assert_eq!(detector.strip_markup(text), "Running it now.");
    }

    #[test]
    fn test_strip_markup_keeps_plain_text() {
        let detector = MarkupDetector::new();
        assert_eq!(detector.strip_markup("No markup here"), "No markup here");
    }
}
