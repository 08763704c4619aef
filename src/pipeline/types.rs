//! Shared types for the ingestion pipeline.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::MessageError;

// ── Classification ──────────────────────────────────────────────────

/// Outcome of the keyword gate for one message.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    /// Matched keyword terms, deduplicated, lowercase.
    pub matched_terms: BTreeSet<String>,
    /// True iff at least one term matched AND at least one attachment
    /// survived the extension filter. Either alone is insufficient.
    pub is_invoice: bool,
}

// ── Upload ──────────────────────────────────────────────────────────

/// A successful upload: store-assigned id plus the name used remotely.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub remote_id: String,
    pub remote_name: String,
}

// ── Archival state ──────────────────────────────────────────────────

/// Per-message archival state.
///
/// `Left`, `MarkedDeleted` and `Failed` are terminal. A `Failed` message
/// keeps its Unseen flag, so the next run's search retries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Unseen,
    Classified,
    Uploading,
    Uploaded,
    CopiedToProcessed,
    MarkedDeleted,
    Left,
    Failed,
}

impl MessageState {
    /// Short label for logging.
    pub fn label(self) -> &'static str {
        match self {
            Self::Unseen => "unseen",
            Self::Classified => "classified",
            Self::Uploading => "uploading",
            Self::Uploaded => "uploaded",
            Self::CopiedToProcessed => "copied_to_processed",
            Self::MarkedDeleted => "marked_deleted",
            Self::Left => "left",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Left | Self::MarkedDeleted | Self::Failed)
    }
}

// ── Outcomes ────────────────────────────────────────────────────────

/// Error detail recorded against a failed message.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeError {
    /// Pipeline stage that raised the error.
    pub stage: &'static str,
    pub message: String,
}

impl From<&MessageError> for OutcomeError {
    fn from(err: &MessageError) -> Self {
        Self {
            stage: err.stage(),
            message: err.to_string(),
        }
    }
}

/// Result of processing a single message. Aggregated in memory only.
#[derive(Debug, Serialize)]
pub struct ProcessingOutcome {
    /// Mailbox sequence id, stable only within this run.
    pub seq: u32,
    pub subject: String,
    pub state: MessageState,
    pub uploads: Vec<UploadResult>,
    pub error: Option<OutcomeError>,
}

/// Machine-parseable batch summary: counts per terminal state plus the
/// per-message outcomes.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    /// Messages archived end to end (`MarkedDeleted`).
    pub processed: usize,
    /// Messages classified not-invoice and left unread.
    pub left: usize,
    /// Messages that hit an error and remain unseen for the next run.
    pub failed: usize,
    pub outcomes: Vec<ProcessingOutcome>,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: Vec<ProcessingOutcome>) -> Self {
        let mut processed = 0;
        let mut left = 0;
        let mut failed = 0;
        for outcome in &outcomes {
            match outcome.state {
                MessageState::MarkedDeleted => processed += 1,
                MessageState::Left => left += 1,
                _ => failed += 1,
            }
        }
        Self {
            processed,
            left,
            failed,
            outcomes,
        }
    }
}
