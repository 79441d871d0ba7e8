//! Page rewrite orchestrator.
//!
//! One call to [`PageRewriter::rewrite`] drives a page through
//! `Tokenized -> Extracted -> BatchesSent -> Reassembled -> Validated` and
//! ends in one of the terminal states `Skipped`, `DryRun`, `Applied` or
//! `Failed`. Batches are awaited one at a time, in chunk order.
//!
//! The rewriter never returns an error for content-shaped problems. Every
//! outcome is a [`RewriteResult`]; when the page cannot be rewritten safely
//! the original content is returned untouched.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::audit::{AuditKind, AuditRecord, AuditSink, NoOpAuditSink};
use crate::batch::{chunk, format_batch, parse_response, RewriteMap};
use crate::config::{RewriteConfig, ValidationPolicy};
use crate::extract::{extract_with_min, Decision, ExtractedText, Extraction};
use crate::markup::{concat_segments, Segment};
use crate::progress::{report, ProgressEvent, ProgressSender};
use crate::prompt::{batch_messages, PromptContext};
use crate::reassemble::{apply_embedded, apply_text_nodes};
use crate::repository::Page;
use crate::service::TextService;
use crate::validate::validate;

/// Where a page is in the rewrite state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteState {
    /// Content split into segments.
    Tokenized,
    /// Rewritable texts selected.
    Extracted,
    /// Nothing to rewrite.
    Skipped,
    /// Dry run: batches logged, nothing sent.
    DryRun,
    /// Every batch has been sent.
    BatchesSent,
    /// Rewrites substituted into the segments.
    Reassembled,
    /// Structure checked.
    Validated,
    /// Rewritten content accepted.
    Applied,
    /// Page left as it was.
    Failed,
}

impl RewriteState {
    /// Returns true for states a rewrite can end in.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Skipped | Self::DryRun | Self::Applied | Self::Failed)
    }
}

impl fmt::Display for RewriteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tokenized => "tokenized",
            Self::Extracted => "extracted",
            Self::Skipped => "skipped",
            Self::DryRun => "dry_run",
            Self::BatchesSent => "batches_sent",
            Self::Reassembled => "reassembled",
            Self::Validated => "validated",
            Self::Applied => "applied",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Outcome of rewriting one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteResult {
    /// False only for `Failed`.
    pub success: bool,
    /// Content to persist. The original content unless the page was applied.
    pub rewritten_content: Option<String>,
    /// Entries in the rewrite map.
    pub texts_rewritten: u32,
    /// Texts selected across both extraction paths.
    pub texts_total: u32,
    /// Batch failures and, under the reject policy, validation failures.
    pub errors: Vec<String>,
    /// Validation diagnostics kept under the warn policy.
    pub warnings: Vec<String>,
    /// Terminal state.
    pub state: RewriteState,
    /// Batches whose request failed.
    pub batches_failed: u32,
    /// SHA-256 of the input content.
    pub original_digest: String,
    /// SHA-256 of `rewritten_content`.
    pub rewritten_digest: Option<String>,
}

impl RewriteResult {
    fn unchanged(content: &str, state: RewriteState, texts_total: u32) -> Self {
        let digest = content_digest(content);
        Self {
            success: state != RewriteState::Failed,
            rewritten_content: Some(content.to_string()),
            texts_rewritten: 0,
            texts_total,
            errors: Vec::new(),
            warnings: Vec::new(),
            state,
            batches_failed: 0,
            original_digest: digest.clone(),
            rewritten_digest: Some(digest),
        }
    }

    /// Whether the rewritten content differs from the original.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.rewritten_digest
            .as_ref()
            .is_some_and(|digest| *digest != self.original_digest)
    }

    /// The content to persist, if it differs from the original.
    #[must_use]
    pub fn changed_content(&self) -> Option<&str> {
        if self.changed() {
            self.rewritten_content.as_deref()
        } else {
            None
        }
    }
}

/// Hex SHA-256 of `content`.
#[must_use]
pub fn content_digest(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Rewrites the copy of one page at a time.
#[derive(Clone)]
pub struct PageRewriter {
    service: Arc<dyn TextService>,
    config: RewriteConfig,
    audit: Arc<dyn AuditSink>,
    progress: Option<ProgressSender>,
}

impl fmt::Debug for PageRewriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageRewriter")
            .field("config", &self.config)
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

impl PageRewriter {
    /// Creates a rewriter with no audit sink and no progress channel.
    #[must_use]
    pub fn new(service: Arc<dyn TextService>, config: RewriteConfig) -> Self {
        Self {
            service,
            config,
            audit: Arc::new(NoOpAuditSink),
            progress: None,
        }
    }

    /// Sets the audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Attaches a progress channel.
    #[must_use]
    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    /// Rewrites a page fetched from a repository.
    pub async fn rewrite_page(&self, page: &Page) -> RewriteResult {
        self.rewrite(&page.title, &page.content).await
    }

    /// Rewrites `content`. See the module docs for the state machine.
    pub async fn rewrite(&self, page_title: &str, content: &str) -> RewriteResult {
        let extraction = extract_with_min(content, self.config.min_text_length);
        debug!(page_title, segments = extraction.segments.len(), state = %RewriteState::Tokenized);

        self.record_decisions(page_title, &extraction).await;
        let texts_total = count(extraction.total());
        debug!(
            page_title,
            texts = texts_total,
            text_nodes = extraction.text_node_count(),
            embedded = extraction.embedded.len(),
            state = %RewriteState::Extracted
        );

        if extraction.is_empty() {
            info!(page_title, "No rewritable text found");
            return self.finish(page_title, RewriteResult::unchanged(content, RewriteState::Skipped, 0));
        }

        let batches = chunk(&extraction.texts, self.config.batch_size);
        report(
            self.progress.as_ref(),
            ProgressEvent::Started {
                page_title: page_title.to_string(),
                texts_total,
                batches: count(batches.len()),
            },
        );

        if self.config.dry_run {
            self.log_dry_run(page_title, &batches).await;
            return self.finish(
                page_title,
                RewriteResult::unchanged(content, RewriteState::DryRun, texts_total),
            );
        }

        let ctx = PromptContext::new(&self.config.niche, page_title);
        let mut rewrites = RewriteMap::new();
        let mut errors = Vec::new();
        let mut batches_failed = 0;

        for (index, batch) in batches.iter().enumerate() {
            match self.send_batch(&ctx, index, batch).await {
                Ok(parsed) => rewrites.extend(parsed),
                Err(message) => {
                    errors.push(message);
                    batches_failed += 1;
                }
            }
        }
        debug!(page_title, rewrites = rewrites.len(), state = %RewriteState::BatchesSent);

        if rewrites.is_empty() {
            if errors.is_empty() {
                errors.push("Service returned no usable rewrites".to_string());
            }
            warn!(page_title, errors = errors.len(), "No rewrites received, page left unchanged");
            let mut result = RewriteResult::unchanged(content, RewriteState::Failed, texts_total);
            result.errors = errors;
            result.batches_failed = batches_failed;
            return self.finish(page_title, result);
        }

        let (reference, rewritten) = reassemble_with_reference(&extraction, &rewrites);
        debug!(page_title, state = %RewriteState::Reassembled);

        let validation = validate(&reference, &rewritten);
        self.audit
            .emit(AuditRecord::new(
                page_title,
                AuditKind::Validation,
                json!({ "valid": validation.valid, "errors": validation.errors }),
            ))
            .await;
        debug!(page_title, valid = validation.valid, state = %RewriteState::Validated);

        let mut warnings = Vec::new();
        if !validation.valid {
            match self.config.validation_policy {
                ValidationPolicy::Warn => {
                    warn!(
                        page_title,
                        errors = ?validation.errors,
                        "Structural validation failed, applying rewrite anyway"
                    );
                    warnings = validation.errors;
                }
                ValidationPolicy::Reject => {
                    warn!(
                        page_title,
                        errors = ?validation.errors,
                        "Structural validation failed, keeping original content"
                    );
                    let mut result = RewriteResult::unchanged(content, RewriteState::Failed, texts_total);
                    errors.extend(validation.errors.iter().map(|e| format!("Validation failed: {e}")));
                    result.errors = errors;
                    result.batches_failed = batches_failed;
                    return self.finish(page_title, result);
                }
            }
        }

        let result = RewriteResult {
            success: true,
            rewritten_digest: Some(content_digest(&rewritten)),
            rewritten_content: Some(rewritten),
            texts_rewritten: count(rewrites.len()),
            texts_total,
            errors,
            warnings,
            state: RewriteState::Applied,
            batches_failed,
            original_digest: content_digest(content),
        };
        self.finish(page_title, result)
    }

    async fn record_decisions(&self, page_title: &str, extraction: &Extraction) {
        for decision in &extraction.decisions {
            let (kind, detail) = match &decision.decision {
                Decision::Accepted { id } => (
                    AuditKind::TextAccepted,
                    json!({
                        "id": id,
                        "text": decision.text,
                        "source": decision.source,
                        "segment_index": decision.segment_index,
                    }),
                ),
                Decision::Rejected { reason } => (
                    AuditKind::TextRejected,
                    json!({
                        "text": decision.text,
                        "reason": reason.as_str(),
                        "source": decision.source,
                        "segment_index": decision.segment_index,
                    }),
                ),
            };
            debug!(page_title, kind = kind.as_str(), text = %decision.text);
            self.audit.emit(AuditRecord::new(page_title, kind, detail)).await;
        }
    }

    async fn log_dry_run(&self, page_title: &str, batches: &[&[ExtractedText]]) {
        for (index, batch) in batches.iter().enumerate() {
            let formatted = format_batch(batch);
            info!(page_title, batch = index, texts = batch.len(), "Dry run, batch not sent");
            self.audit
                .emit(AuditRecord::new(
                    page_title,
                    AuditKind::DryRun,
                    json!({ "batch": index, "user": formatted }),
                ))
                .await;
        }
    }

    /// Sends one batch and keeps the parsed entries that belong to it.
    async fn send_batch(
        &self,
        ctx: &PromptContext,
        index: usize,
        batch: &[ExtractedText],
    ) -> Result<RewriteMap, String> {
        let page_title = ctx.page_title.as_str();
        let formatted = format_batch(batch);
        let messages = batch_messages(ctx, &formatted);

        self.audit
            .emit(AuditRecord::new(
                page_title,
                AuditKind::BatchRequest,
                json!({
                    "batch": index,
                    "messages": messages,
                }),
            ))
            .await;
        report(
            self.progress.as_ref(),
            ProgressEvent::BatchSent {
                index: count(index),
                count: count(batch.len()),
            },
        );
        info!(page_title, batch = index, texts = batch.len(), "Sending batch");

        let completion = match self.service.complete(&messages).await {
            Ok(completion) => completion,
            Err(err) => {
                let message = format!("Batch {} failed: {err}", index + 1);
                warn!(page_title, batch = index, error = %err, "Batch request failed");
                self.audit
                    .emit(AuditRecord::new(
                        page_title,
                        AuditKind::BatchFailed,
                        json!({ "batch": index, "error": err.to_string() }),
                    ))
                    .await;
                report(
                    self.progress.as_ref(),
                    ProgressEvent::BatchFailed {
                        index: count(index),
                        error: message.clone(),
                    },
                );
                return Err(message);
            }
        };

        self.audit
            .emit(AuditRecord::new(
                page_title,
                AuditKind::BatchResponse,
                json!({
                    "batch": index,
                    "response": completion.content,
                    "usage": completion.to_attributes(),
                }),
            ))
            .await;

        let ids: HashSet<u32> = batch.iter().map(|text| text.id).collect();
        let mut parsed = parse_response(&completion.content);
        parsed.retain(|id, _| {
            let known = ids.contains(id);
            if !known {
                debug!(page_title, batch = index, id, "Ignoring id outside the batch");
            }
            known
        });
        if parsed.len() < batch.len() {
            debug!(
                page_title,
                batch = index,
                missing = batch.len() - parsed.len(),
                "Response left some texts unchanged"
            );
        }
        report(
            self.progress.as_ref(),
            ProgressEvent::BatchCompleted {
                index: count(index),
                rewritten: count(parsed.len()),
            },
        );
        Ok(parsed)
    }

    fn finish(&self, page_title: &str, result: RewriteResult) -> RewriteResult {
        info!(
            page_title,
            state = %result.state,
            texts_rewritten = result.texts_rewritten,
            texts_total = result.texts_total,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "Page rewrite finished"
        );
        report(
            self.progress.as_ref(),
            ProgressEvent::Finished {
                page_title: page_title.to_string(),
                state: result.state,
                texts_rewritten: result.texts_rewritten,
            },
        );
        result
    }
}

/// Applies both substitution rules and returns the validation reference
/// alongside the final content.
///
/// The reference is the original segment list with only the embedded
/// substitutions applied: those change block comments on purpose, so they
/// are part of the expected structure. Text-node rewrites are what the
/// validator checks.
fn reassemble_with_reference(
    extraction: &Extraction,
    rewrites: &RewriteMap,
) -> (Vec<Segment>, String) {
    let mut reference = extraction.segments.clone();
    apply_embedded(&mut reference, &extraction.embedded, rewrites);
    let mut working = reference.clone();
    apply_text_nodes(&mut working, rewrites);
    (reference, concat_segments(&working))
}
