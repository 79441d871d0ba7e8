//! Numbered line protocol spoken with the text-generation service.
//!
//! Requests are one line per text, `[{id}] ({context}) {original}`.
//! Responses are read back as `[{id}] {rewritten}`; anything else is ignored.

use crate::extract::ExtractedText;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Default number of texts per request.
pub const DEFAULT_BATCH_SIZE: usize = 30;

/// Sparse mapping from extracted-text id to rewritten copy.
pub type RewriteMap = BTreeMap<u32, String>;

/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static RESPONSE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[(\d+)\]\s*(.*)$").unwrap());

#[allow(clippy::unwrap_used)]
static BOLD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());

#[allow(clippy::unwrap_used)]
static ITALIC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*\s](?:[^*]*[^*\s])?)\*").unwrap());

#[allow(clippy::unwrap_used)]
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Splits texts into consecutive batches of at most `size` entries.
///
/// Order is preserved across batch boundaries. A `size` of zero is treated as one.
#[must_use]
pub fn chunk(texts: &[ExtractedText], size: usize) -> Vec<&[ExtractedText]> {
    texts.chunks(size.max(1)).collect()
}

/// Formats one batch as the user message of a request.
///
/// Internal whitespace runs are collapsed so every entry stays on one line.
#[must_use]
pub fn format_batch(batch: &[ExtractedText]) -> String {
    batch
        .iter()
        .map(|text| {
            format!(
                "[{}] ({}) {}",
                text.id,
                text.context,
                WHITESPACE_RE.replace_all(text.original.trim(), " ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses a numbered response into a map.
///
/// Lines not shaped like `[digits] rest` are skipped, as are entries whose
/// value is empty once trimmed and stripped of emphasis. A repeated id keeps
/// its last value.
#[must_use]
pub fn parse_response(response: &str) -> RewriteMap {
    let mut map = RewriteMap::new();
    for line in response.lines() {
        let Some(caps) = RESPONSE_LINE_RE.captures(line) else {
            continue;
        };
        let Ok(id) = caps[1].parse::<u32>() else {
            continue;
        };
        let value = strip_emphasis(caps[2].trim());
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        map.insert(id, value.to_string());
    }
    map
}

/// Replaces `**bold**` and `*italic*` markers with the enclosed text.
#[must_use]
pub fn strip_emphasis(text: &str) -> String {
    let without_bold = BOLD_RE.replace_all(text, "$1");
    ITALIC_RE.replace_all(&without_bold, "$1").into_owned()
}
