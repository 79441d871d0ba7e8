//! Combined extraction over both copy locations: text nodes and embedded
//! block attributes.

use crate::markup::{
    classify_context, extract_embedded_texts_with, rejection_reason_with_min, tokenize,
    ContextLabel, EmbeddedText, RejectReason, ScopeTracker, Segment, MIN_TEXT_LENGTH,
};
use serde::{Deserialize, Serialize};

/// Where an extracted text lives in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    /// Between tags.
    TextNode,
    /// Inside a block comment's JSON attributes.
    EmbeddedAttr,
}

/// A piece of copy selected for rewriting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedText {
    /// Unique per page. Text-node ids come before embedded ids.
    pub id: u32,
    /// Index of the owning segment.
    pub segment_index: usize,
    /// Copy as sent to the service (trimmed).
    pub original: String,
    /// Call-site role.
    pub context: ContextLabel,
    /// Extraction path.
    pub source: TextSource,
}

/// Outcome of evaluating one candidate text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
    /// Selected under this id.
    Accepted {
        /// Assigned id.
        id: u32,
    },
    /// Left alone.
    Rejected {
        /// Rule that excluded it.
        reason: RejectReason,
    },
}

/// One accept/reject evaluation, kept for the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDecision {
    /// Segment the candidate came from.
    pub segment_index: usize,
    /// Trimmed candidate text.
    pub text: String,
    /// Extraction path.
    pub source: TextSource,
    /// What happened to it.
    pub decision: Decision,
}

impl TextDecision {
    /// Whether the candidate was selected.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self.decision, Decision::Accepted { .. })
    }
}

/// Everything extraction learned about one page.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Tokenized page; selected text segments carry their `text_id`.
    pub segments: Vec<Segment>,
    /// All selected texts, text nodes first, in document order within each path.
    pub texts: Vec<ExtractedText>,
    /// Embedded subset, needed again at reassembly.
    pub embedded: Vec<EmbeddedText>,
    /// Every evaluated candidate, accepted or not.
    pub decisions: Vec<TextDecision>,
}

impl Extraction {
    /// Number of selected texts across both paths.
    #[must_use]
    pub fn total(&self) -> usize {
        self.texts.len()
    }

    /// Whether nothing was selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Number of selected text-node texts.
    #[must_use]
    pub fn text_node_count(&self) -> usize {
        self.texts.len() - self.embedded.len()
    }
}

/// Tokenizes and extracts with the default minimum length.
#[must_use]
pub fn extract(content: &str) -> Extraction {
    extract_with_min(content, MIN_TEXT_LENGTH)
}

/// Tokenizes `content` and selects every rewritable text.
///
/// Whitespace-only text segments are layout, not candidates, and are not
/// recorded as decisions.
#[must_use]
pub fn extract_with_min(content: &str, min_length: usize) -> Extraction {
    let mut segments = tokenize(content);
    let mut scope = ScopeTracker::new();
    let mut texts = Vec::new();
    let mut decisions = Vec::new();
    let mut next_id: u32 = 1;

    for index in 0..segments.len() {
        scope.observe(&segments[index]);
        if !segments[index].is_text() {
            continue;
        }
        let trimmed = segments[index].raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        let verdict = if scope.in_verbatim() {
            Some(RejectReason::VerbatimScope)
        } else {
            rejection_reason_with_min(trimmed, min_length)
        };

        let decision = match verdict {
            Some(reason) => Decision::Rejected { reason },
            None => {
                let id = next_id;
                next_id += 1;
                texts.push(ExtractedText {
                    id,
                    segment_index: index,
                    original: trimmed.to_string(),
                    context: classify_context(&segments, index),
                    source: TextSource::TextNode,
                });
                Decision::Accepted { id }
            }
        };
        decisions.push(TextDecision {
            segment_index: index,
            text: trimmed.to_string(),
            source: TextSource::TextNode,
            decision,
        });
    }

    for text in &texts {
        segments[text.segment_index].set_text_id(text.id);
    }

    let embedded = extract_embedded_texts_with(&segments, next_id, min_length, |index, text, reason| {
        decisions.push(TextDecision {
            segment_index: index,
            text: text.to_string(),
            source: TextSource::EmbeddedAttr,
            decision: Decision::Rejected { reason },
        });
    });

    for item in &embedded {
        decisions.push(TextDecision {
            segment_index: item.segment_index,
            text: item.original.clone(),
            source: TextSource::EmbeddedAttr,
            decision: Decision::Accepted { id: item.id },
        });
        texts.push(ExtractedText {
            id: item.id,
            segment_index: item.segment_index,
            original: item.original.clone(),
            context: item.context(),
            source: TextSource::EmbeddedAttr,
        });
    }

    Extraction {
        segments,
        texts,
        embedded,
        decisions,
    }
}
