// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tolerant markup recovery
//!
//! Malformed markup is recovered in two phases: the round text is segmented
//! into tagged and untagged runs, then each tool-shaped tag is re-parsed and
//! rewritten with canonical attribute formatting. Untagged runs and tags that
//! are not tool-shaped pass through byte for byte, so human-readable text is
//! never altered.

/// Tags the normalizer is allowed to rewrite.
const TOOL_SHAPED_TAGS: &[&str] = &["tool", "param", "done", "wait"];

enum Run<'a> {
    Tag(&'a str),
    Text(&'a str),
}

/// Re-segment the text and normalize tool-shaped tags.
///
/// Returns `None` when no tool-shaped tag is present, in which case callers
/// keep the original text.
pub fn normalize_markup(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut found_tool_shaped = false;

    for run in segment(text) {
        match run {
            Run::Text(raw) => out.push_str(raw),
            Run::Tag(raw) => match normalize_tag(raw) {
                Some(normalized) => {
                    found_tool_shaped = true;
                    out.push_str(&normalized);
                }
                None => out.push_str(raw),
            },
        }
    }

    found_tool_shaped.then_some(out)
}

/// Split text into tag runs (`<`..`>` with quote-aware scanning) and text
/// runs. A `<` with no closing `>` is treated as text.
fn segment(text: &str) -> Vec<Run<'_>> {
    let mut runs = Vec::new();
    let mut text_start = 0;
    let mut search = 0;

    while let Some(rel) = text[search..].find('<') {
        let open = search + rel;
        match find_tag_end(text, open) {
            Some(close) => {
                if open > text_start {
                    runs.push(Run::Text(&text[text_start..open]));
                }
                runs.push(Run::Tag(&text[open..=close]));
                text_start = close + 1;
                search = close + 1;
            }
            None => {
                search = open + 1;
            }
        }
    }

    if text_start < text.len() {
        runs.push(Run::Text(&text[text_start..]));
    }
    runs
}

/// Find the byte index of the `>` that closes the tag opened at `open`,
/// skipping `>` inside quoted attribute values. Returns `None` when another
/// `<` appears first or the text ends.
fn find_tag_end(text: &str, open: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (offset, ch) in text[open + 1..].char_indices() {
        let index = open + 1 + offset;
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                '>' => return Some(index),
                '<' => return None,
                _ => {}
            },
        }
    }
    None
}

/// Rewrite one tag with canonical formatting, or `None` when the tag is not
/// tool-shaped or does not parse as a tag at all.
fn normalize_tag(raw: &str) -> Option<String> {
    let inner = raw[1..raw.len() - 1].trim();
    let (closing, rest) = match inner.strip_prefix('/') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, inner),
    };

    let name_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(rest.len());
    if name_len == 0 {
        return None;
    }
    let name = rest[..name_len].to_ascii_lowercase();
    if !TOOL_SHAPED_TAGS.contains(&name.as_str()) {
        return None;
    }

    let mut rest = rest[name_len..].trim_start();
    if closing {
        if !rest.is_empty() {
            return None;
        }
        return Some(format!("</{}>", name));
    }

    let mut attrs: Vec<(String, String)> = Vec::new();
    let mut self_closing = false;
    while !rest.is_empty() {
        if let Some(after_slash) = rest.strip_prefix('/') {
            if after_slash.trim().is_empty() {
                self_closing = true;
                break;
            }
            return None;
        }

        let attr_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(rest.len());
        if attr_len == 0 {
            return None;
        }
        let attr_name = rest[..attr_len].to_ascii_lowercase();
        rest = rest[attr_len..].trim_start();

        rest = rest.strip_prefix('=')?.trim_start();

        let value;
        if let Some(quoted) = rest.strip_prefix('"') {
            let close = quoted.find('"')?;
            value = quoted[..close].to_string();
            rest = quoted[close + 1..].trim_start();
        } else if let Some(quoted) = rest.strip_prefix('\'') {
            let close = quoted.find('\'')?;
            value = quoted[..close].to_string();
            rest = quoted[close + 1..].trim_start();
        } else {
            let value_len = rest
                .find(|c: char| c.is_whitespace() || c == '/')
                .unwrap_or(rest.len());
            if value_len == 0 {
                return None;
            }
            value = rest[..value_len].to_string();
            rest = rest[value_len..].trim_start();
        }
        attrs.push((attr_name, value));
    }

    let mut out = format!("<{}", name);
    for (attr_name, value) in &attrs {
        out.push(' ');
        out.push_str(attr_name);
        out.push_str("=\"");
        out.push_str(value);
        out.push('"');
    }
    if self_closing {
        out.push_str("/>");
    } else {
        out.push('>');
    }
    Some(out)
}
