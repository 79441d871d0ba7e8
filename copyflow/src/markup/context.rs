//! Semantic role of a text span, so rewritten copy stays fit for its slot.

use super::tokenizer::Segment;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The call-site role of an extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextLabel {
    /// `h1`-`h6`.
    Heading,
    /// `p`.
    Body,
    /// `a`.
    LinkText,
    /// `button`.
    ButtonLabel,
    /// `span`.
    InlineText,
    /// `li`.
    ListItem,
    /// `blockquote`, or a testimonial/review section.
    Testimonial,
    /// `figcaption`.
    Caption,
    /// `label`.
    Label,
    /// `td`/`th`.
    TableCell,
    /// Block type of an embedded attribute, e.g. `heading-h2`.
    Block(String),
    /// Anything else.
    Text,
}

impl ContextLabel {
    /// Maps an opening tag name to a label.
    #[must_use]
    pub fn from_tag(tag_name: &str) -> Self {
        match tag_name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => Self::Heading,
            "p" => Self::Body,
            "a" => Self::LinkText,
            "button" => Self::ButtonLabel,
            "span" => Self::InlineText,
            "li" => Self::ListItem,
            "blockquote" => Self::Testimonial,
            "figcaption" => Self::Caption,
            "label" => Self::Label,
            "td" | "th" => Self::TableCell,
            _ => Self::Text,
        }
    }

    /// Label implied by a block comment, if it carries a recognizable hint.
    #[must_use]
    pub fn from_comment_hint(raw: &str) -> Option<Self> {
        let lower = raw.to_ascii_lowercase();
        if lower.contains("testimonial") || lower.contains("review") {
            Some(Self::Testimonial)
        } else if lower.contains("heading") {
            Some(Self::Heading)
        } else if lower.contains("button") {
            Some(Self::ButtonLabel)
        } else if lower.contains("list") {
            Some(Self::ListItem)
        } else {
            None
        }
    }

    /// The label as it appears in a batch request line.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heading => "heading",
            Self::Body => "body",
            Self::LinkText => "link text",
            Self::ButtonLabel => "button label",
            Self::InlineText => "inline text",
            Self::ListItem => "list item",
            Self::Testimonial => "testimonial",
            Self::Caption => "caption",
            Self::Label => "label",
            Self::TableCell => "table cell",
            Self::Block(name) => name,
            Self::Text => "text",
        }
    }
}

impl fmt::Display for ContextLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labels the segment at `index` by walking backward to the nearest clue.
///
/// The first opening tag found decides the label. An opening block comment
/// met before any tag wins instead when it carries a section hint. Closing
/// block comments (`<!-- /wp:... -->`) end a block and are skipped.
#[must_use]
pub fn classify_context(segments: &[Segment], index: usize) -> ContextLabel {
    let end = index.min(segments.len());
    for segment in segments[..end].iter().rev() {
        if segment.is_comment() {
            if is_closing_comment(&segment.raw) {
                continue;
            }
            if let Some(label) = ContextLabel::from_comment_hint(&segment.raw) {
                return label;
            }
        } else if segment.is_opening_tag() {
            if let Some(name) = segment.tag_name() {
                return ContextLabel::from_tag(name);
            }
        }
    }
    ContextLabel::Text
}

fn is_closing_comment(raw: &str) -> bool {
    raw.trim_start_matches("<!--").trim_start().starts_with('/')
}
