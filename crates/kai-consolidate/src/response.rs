//! Helpers for pulling payloads out of loosely formatted completion text.

use regex::Regex;
use std::sync::LazyLock;

/// First fenced block anywhere in the text; group 1 is the body.
static FENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```[A-Za-z0-9_+.-]*[ \t]*\r?\n?([\s\S]*?)\r?\n?[ \t]*```").unwrap()
});

const FENCE: &str = "```";

/// Body of the first fenced code block, if there is one.
pub fn extract_fenced(text: &str) -> Option<&str> {
    FENCE_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Substring from the first `{` or `[` to the last matching closer.
///
/// Tolerates prose before and after a JSON payload.
pub fn extract_bracketed(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Result of stripping a whole-response fence from generated file content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fencing<'a> {
    /// No fence at either end; text is used verbatim
    Unfenced(&'a str),
    /// Opened and closed by a fence; the body between them
    Stripped(&'a str),
    /// Fence at only one end; text is kept verbatim
    Partial(&'a str),
}

impl<'a> Fencing<'a> {
    pub fn content(&self) -> &'a str {
        match self {
            Fencing::Unfenced(s) | Fencing::Stripped(s) | Fencing::Partial(s) => s,
        }
    }
}

/// Strip a fence only when the response both starts and ends with one.
pub fn strip_enclosing_fence(text: &str) -> Fencing<'_> {
    let trimmed = text.trim();
    let starts = trimmed.starts_with(FENCE);
    let ends = trimmed.len() >= 2 * FENCE.len() && trimmed.ends_with(FENCE);

    match (starts, ends) {
        (true, true) => {
            let inner = &trimmed[FENCE.len()..trimmed.len() - FENCE.len()];
            // The rest of the opening line is a language tag
            let body = match inner.find('\n') {
                Some(newline) => &inner[newline + 1..],
                None => inner,
            };
            Fencing::Stripped(body)
        }
        (false, false) => Fencing::Unfenced(text),
        _ => Fencing::Partial(text),
    }
}
