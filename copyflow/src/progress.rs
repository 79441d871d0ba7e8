//! Progress events streamed from the rewriter to whoever drives it.

use crate::rewriter::RewriteState;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Sending half handed to the rewriter.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Receiving half kept by the driver.
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// Creates a progress channel.
#[must_use]
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// A status update for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Extraction finished.
    Started {
        /// Page title.
        page_title: String,
        /// Number of texts selected.
        texts_total: u32,
        /// Number of batches that will be sent.
        batches: u32,
    },
    /// A batch request is about to be sent.
    BatchSent {
        /// Zero-based batch index.
        index: u32,
        /// Texts in the batch.
        count: u32,
    },
    /// A batch came back.
    BatchCompleted {
        /// Zero-based batch index.
        index: u32,
        /// Texts the response covered.
        rewritten: u32,
    },
    /// A batch request failed.
    BatchFailed {
        /// Zero-based batch index.
        index: u32,
        /// Error message.
        error: String,
    },
    /// The page reached a terminal state.
    Finished {
        /// Page title.
        page_title: String,
        /// Terminal state.
        state: RewriteState,
        /// Texts rewritten.
        texts_rewritten: u32,
    },
}

/// Sends an event if a channel is attached. A closed receiver is ignored.
pub(crate) fn report(sender: Option<&ProgressSender>, event: ProgressEvent) {
    if let Some(tx) = sender {
        let _ = tx.send(event);
    }
}
