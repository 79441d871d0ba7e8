//! Decides whether a text span is genuine copy or incidental content.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Minimum number of trimmed characters for a text to be worth rewriting.
pub const MIN_TEXT_LENGTH: usize = 4;

// SAFETY: Patterns below are compile-time constants that are known to be valid.

#[allow(clippy::unwrap_used)]
static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\d\s\p{P}]+$").unwrap());

#[allow(clippy::unwrap_used)]
static ENTITIES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\s*&(?:#\d+|#[xX][0-9a-fA-F]+|[A-Za-z][A-Za-z0-9]*);\s*)+$").unwrap()
});

#[allow(clippy::unwrap_used)]
static SHORTCODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\s*\[/?[A-Za-z_][^\[\]]*\]\s*)+$").unwrap());

#[allow(clippy::unwrap_used)]
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)(?:https?://|www\.)\S+$").unwrap());

#[allow(clippy::unwrap_used)]
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:mailto:)?[^\s@]+@[^\s@]+\.[A-Za-z]{2,}$").unwrap());

#[allow(clippy::unwrap_used)]
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:tel:)?\+?[\d\s().\-/]{7,}$").unwrap());

#[allow(clippy::unwrap_used)]
static CURRENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[$€£¥₹]\s?\d[\d,.\s]*(?:[kKmM])?|\d[\d,.\s]*\s?[$€£¥₹]|(?i:usd|eur|gbp)\s?\d[\d,.]*)(?:\s*/\s*\w+)?$",
    )
    .unwrap()
});

/// Why a text was not sent for rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Nothing left after trimming.
    Empty,
    /// Fewer trimmed characters than the minimum.
    TooShort,
    /// Only digits, punctuation, and whitespace.
    NumericOrPunctuation,
    /// Only HTML entities.
    EntitiesOnly,
    /// One or more bracket shortcodes.
    Shortcode,
    /// A bare URL.
    Url,
    /// A bare email address.
    Email,
    /// Shaped like a phone number.
    Phone,
    /// Shaped like a price.
    Currency,
    /// Inside script, style, code, or similar containers.
    VerbatimScope,
}

impl RejectReason {
    /// Returns the snake_case name used in audit records.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::TooShort => "too_short",
            Self::NumericOrPunctuation => "numeric_or_punctuation",
            Self::EntitiesOnly => "entities_only",
            Self::Shortcode => "shortcode",
            Self::Url => "url",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Currency => "currency",
            Self::VerbatimScope => "verbatim_scope",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the first exclusion rule the text matches, using [`MIN_TEXT_LENGTH`].
#[must_use]
pub fn rejection_reason(text: &str) -> Option<RejectReason> {
    rejection_reason_with_min(text, MIN_TEXT_LENGTH)
}

/// Returns the first exclusion rule the text matches.
///
/// Rules are checked in a fixed order so the reported reason is stable.
#[must_use]
pub fn rejection_reason_with_min(text: &str, min_length: usize) -> Option<RejectReason> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(RejectReason::Empty);
    }
    if trimmed.chars().count() < min_length {
        return Some(RejectReason::TooShort);
    }
    if NUMERIC_RE.is_match(trimmed) {
        return Some(RejectReason::NumericOrPunctuation);
    }
    if ENTITIES_RE.is_match(trimmed) {
        return Some(RejectReason::EntitiesOnly);
    }
    if SHORTCODE_RE.is_match(trimmed) {
        return Some(RejectReason::Shortcode);
    }
    if URL_RE.is_match(trimmed) {
        return Some(RejectReason::Url);
    }
    if EMAIL_RE.is_match(trimmed) {
        return Some(RejectReason::Email);
    }
    if PHONE_RE.is_match(trimmed) {
        return Some(RejectReason::Phone);
    }
    if CURRENCY_RE.is_match(trimmed) {
        return Some(RejectReason::Currency);
    }
    None
}

/// Whether the text is incidental content that must not be rewritten.
#[must_use]
pub fn is_non_rewritable(text: &str) -> bool {
    rejection_reason(text).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_boundary() {
        assert!(is_non_rewritable("123"));
        assert!(!is_non_rewritable("Book your appointment today"));
        assert!(is_non_rewritable("a"));
    }

    #[test]
    fn test_min_length_counts_trimmed_chars() {
        assert_eq!(rejection_reason("   abc   "), Some(RejectReason::TooShort));
        assert_eq!(rejection_reason("  abcd  "), None);
        assert_eq!(rejection_reason("über"), None);
        assert_eq!(rejection_reason_with_min("abcd", 10), Some(RejectReason::TooShort));
    }

    #[test]
    fn test_empty() {
        assert_eq!(rejection_reason(""), Some(RejectReason::Empty));
        assert_eq!(rejection_reason(" \n\t "), Some(RejectReason::Empty));
    }

    #[test]
    fn test_numeric_and_punctuation() {
        assert_eq!(rejection_reason("2024"), Some(RejectReason::NumericOrPunctuation));
        assert_eq!(rejection_reason("12.5 - 14.0"), Some(RejectReason::NumericOrPunctuation));
        assert_eq!(rejection_reason("....!!"), Some(RejectReason::NumericOrPunctuation));
        assert_eq!(rejection_reason("Open 24/7"), None);
    }

    #[test]
    fn test_entities_only() {
        assert_eq!(rejection_reason("&nbsp;&nbsp;"), Some(RejectReason::EntitiesOnly));
        assert_eq!(rejection_reason("&copy; &#8212; &#x2014;"), Some(RejectReason::EntitiesOnly));
        assert_eq!(rejection_reason("&copy; Acme Plumbing"), None);
    }

    #[test]
    fn test_shortcodes() {
        assert_eq!(rejection_reason("[contact-form-7 id=\"12\"]"), Some(RejectReason::Shortcode));
        assert_eq!(rejection_reason("[gallery] [/gallery]"), Some(RejectReason::Shortcode));
        assert_eq!(rejection_reason("[gallery] with words"), None);
    }

    #[test]
    fn test_urls_and_emails() {
        assert_eq!(rejection_reason("https://example.com/about"), Some(RejectReason::Url));
        assert_eq!(rejection_reason("www.example.com"), Some(RejectReason::Url));
        assert_eq!(rejection_reason("hello@example.com"), Some(RejectReason::Email));
        assert_eq!(rejection_reason("Visit https://example.com today"), None);
    }

    #[test]
    fn test_phone_numbers() {
        assert_eq!(rejection_reason("+1 (555) 123-4567"), Some(RejectReason::Phone));
        assert_eq!(rejection_reason("tel:+441234567890"), Some(RejectReason::Phone));
    }

    #[test]
    fn test_currency() {
        assert_eq!(rejection_reason("$49.99"), Some(RejectReason::Currency));
        assert_eq!(rejection_reason("€ 1,200"), Some(RejectReason::Currency));
        assert_eq!(rejection_reason("$29/mo"), Some(RejectReason::Currency));
        assert_eq!(rejection_reason("USD 300"), Some(RejectReason::Currency));
        assert_eq!(rejection_reason("Plans from $29 a month"), None);
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(RejectReason::VerbatimScope.to_string(), "verbatim_scope");
        assert_eq!(
            serde_json::to_value(RejectReason::NumericOrPunctuation).unwrap(),
            serde_json::json!("numeric_or_punctuation")
        );
    }
}
