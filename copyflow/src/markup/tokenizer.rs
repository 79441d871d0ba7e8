//! Flat, gap-free lexer for block-editor markup.
//!
//! Comments (`<!-- ... -->`) and tags (`<...>`) become atomic opaque
//! segments; everything between them is text. No nesting is tracked here.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Comment spans win over tag spans because they are tried first.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static MARKUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->|</?[A-Za-z][^>]*>").unwrap());

/// Elements that never have a closing tag, whether or not they are written `<br/>`.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// What a segment is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SegmentKind {
    /// Any `<!-- ... -->` span.
    BlockComment,
    /// Any `<...>` span.
    Tag {
        /// Lowercased element name.
        tag_name: String,
        /// `</name>` form.
        is_closing: bool,
        /// `<name/>` form or a void element.
        is_self_closing: bool,
    },
    /// Everything else.
    Text {
        /// Assigned during extraction when the text is sent for rewriting.
        text_id: Option<u32>,
    },
}

/// An atomic, ordered span of a tokenized document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Byte offset of the first byte in the source.
    pub start: usize,
    /// Byte offset one past the last byte in the source.
    pub end: usize,
    /// The exact source bytes (rewritten in place by the reassembler).
    pub raw: String,
    /// Segment type.
    pub kind: SegmentKind,
}

impl Segment {
    fn text(start: usize, raw: &str) -> Self {
        Self {
            start,
            end: start + raw.len(),
            raw: raw.to_string(),
            kind: SegmentKind::Text { text_id: None },
        }
    }

    fn markup(start: usize, raw: &str) -> Self {
        let kind = if raw.starts_with("<!--") {
            SegmentKind::BlockComment
        } else {
            let is_closing = raw.starts_with("</");
            let tag_name = tag_name_of(raw);
            let is_self_closing =
                !is_closing && (raw.ends_with("/>") || VOID_ELEMENTS.contains(&tag_name.as_str()));
            SegmentKind::Tag {
                tag_name,
                is_closing,
                is_self_closing,
            }
        };
        Self {
            start,
            end: start + raw.len(),
            raw: raw.to_string(),
            kind,
        }
    }

    /// Whether this is a text segment.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self.kind, SegmentKind::Text { .. })
    }

    /// Whether this is a block comment.
    #[must_use]
    pub fn is_comment(&self) -> bool {
        matches!(self.kind, SegmentKind::BlockComment)
    }

    /// Whether this is a tag.
    #[must_use]
    pub fn is_tag(&self) -> bool {
        matches!(self.kind, SegmentKind::Tag { .. })
    }

    /// The tag name, for tag segments.
    #[must_use]
    pub fn tag_name(&self) -> Option<&str> {
        match &self.kind {
            SegmentKind::Tag { tag_name, .. } => Some(tag_name),
            _ => None,
        }
    }

    /// Whether this is an opening tag that expects a matching close.
    #[must_use]
    pub fn is_opening_tag(&self) -> bool {
        matches!(
            self.kind,
            SegmentKind::Tag {
                is_closing: false,
                is_self_closing: false,
                ..
            }
        )
    }

    /// Whether this is a closing tag.
    #[must_use]
    pub fn is_closing_tag(&self) -> bool {
        matches!(self.kind, SegmentKind::Tag { is_closing: true, .. })
    }

    /// The extraction id of a text segment, if one was assigned.
    #[must_use]
    pub fn text_id(&self) -> Option<u32> {
        match self.kind {
            SegmentKind::Text { text_id } => text_id,
            _ => None,
        }
    }

    /// Assigns an extraction id. No-op on non-text segments.
    pub fn set_text_id(&mut self, id: u32) {
        if let SegmentKind::Text { text_id } = &mut self.kind {
            *text_id = Some(id);
        }
    }
}

fn tag_name_of(raw: &str) -> String {
    raw.trim_start_matches('<')
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == ':' || *c == '_')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Splits content into an ordered, gap-free sequence of segments.
///
/// Never fails: anything that does not look like a comment or a tag
/// (an unterminated `<!--`, a stray `<`) stays inside a text segment.
#[must_use]
pub fn tokenize(content: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for m in MARKUP_RE.find_iter(content) {
        if m.start() > cursor {
            segments.push(Segment::text(cursor, &content[cursor..m.start()]));
        }
        segments.push(Segment::markup(m.start(), m.as_str()));
        cursor = m.end();
    }

    if cursor < content.len() {
        segments.push(Segment::text(cursor, &content[cursor..]));
    }

    segments
}

/// Concatenates every segment's raw content in order.
#[must_use]
pub fn concat_segments(segments: &[Segment]) -> String {
    let capacity = segments.iter().map(|s| s.raw.len()).sum();
    segments.iter().fold(String::with_capacity(capacity), |mut out, s| {
        out.push_str(&s.raw);
        out
    })
}
