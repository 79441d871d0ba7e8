//! Markup handling: lexing, copy classification, scope and context tracking,
//! and embedded attribute copy.
//!
//! This module provides:
//! - A flat lexer that splits content into comment, tag, and text segments
//! - Rules that tell genuine copy from numbers, URLs, shortcodes, and prices
//! - A tag stack that keeps extraction out of script/style/code containers
//! - Call-site labels (heading, body, button label, ...) for each text
//! - Extraction and rewriting of copy stored in block comment JSON

mod classify;
mod context;
mod embedded;
mod scope;
mod tokenizer;

pub use classify::{
    is_non_rewritable, rejection_reason, rejection_reason_with_min, RejectReason,
    MIN_TEXT_LENGTH,
};
pub use context::{classify_context, ContextLabel};
pub use embedded::{
    extract_embedded_texts, extract_embedded_texts_with, rewrite_embedded_block, EmbeddedBlock,
    EmbeddedText, TEXT_ATTRIBUTE,
};
pub use scope::{ScopeTracker, VERBATIM_TAGS};
pub use tokenizer::{concat_segments, tokenize, Segment, SegmentKind};
