//! # Copyflow
//!
//! Structure-preserving copy rewriting for block-editor page markup.
//!
//! A page's stored markup is split into a flat stream of comments, tags and
//! text. Visible copy is pulled out of text nodes and out of the JSON
//! attributes of self-closing block comments, sent in numbered batches to a
//! text-generation service, and substituted back in place. Every tag and
//! comment outside the rewritten values is kept byte for byte, and a
//! structural check compares the result against the original skeleton.
//!
//! - **Markup**: tokenizer, rewritability rules, scope and context tracking
//! - **Batching**: `[id] (context) text` request lines and tolerant response parsing
//! - **Orchestration**: per-page state machine with partial-failure semantics
//! - **Site driver**: sequential page processing over a content repository
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use copyflow::prelude::*;
//! use std::sync::Arc;
//!
//! let service = Arc::new(HttpTextService::from_env()?);
//! let rewriter = PageRewriter::new(service, RewriteConfig::new("emergency plumbing"));
//!
//! let result = rewriter.rewrite("Home", "<h2>Old headline</h2>").await;
//! if result.changed() {
//!     println!("{}", result.rewritten_content.unwrap_or_default());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod audit;
pub mod batch;
pub mod cancellation;
pub mod config;
pub mod errors;
pub mod extract;
pub mod markup;
pub mod observability;
pub mod progress;
pub mod prompt;
pub mod reassemble;
pub mod repository;
pub mod rewriter;
pub mod service;
pub mod site;
pub mod testing;
pub mod validate;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::audit::{
        AuditKind, AuditRecord, AuditSink, CollectingAuditSink, JsonlAuditSink,
        LoggingAuditSink, NoOpAuditSink,
    };
    pub use crate::batch::{chunk, format_batch, parse_response, RewriteMap};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{RetryConfig, RewriteConfig, ServiceConfig, ValidationPolicy};
    pub use crate::errors::{CopyflowError, Result, ServiceError};
    pub use crate::extract::{extract, ExtractedText, Extraction, TextSource};
    pub use crate::markup::{
        classify_context, is_non_rewritable, tokenize, ContextLabel, RejectReason, Segment,
        SegmentKind,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::progress::{progress_channel, ProgressEvent, ProgressReceiver, ProgressSender};
    pub use crate::reassemble::reassemble;
    pub use crate::repository::{ContentRepository, Page, PageId, SiteHandle, WpCliRepository};
    pub use crate::rewriter::{PageRewriter, RewriteResult, RewriteState};
    #[cfg(feature = "http")]
    pub use crate::service::HttpTextService;
    pub use crate::service::{ChatMessage, Completion, TextService};
    pub use crate::site::{SiteRewriteSummary, SiteRewriter};
    pub use crate::validate::{validate, ValidationResult};
}
