//! Per-batch ingestion summary.

use std::fmt;

use serde::Serialize;

/// What reconciliation did to one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocStatus {
    /// Ledger already matched the content
    Unchanged,
    /// First time this `doc_id` was indexed
    Created,
    /// Some chunks were inserted or removed
    Updated,
    /// All chunks and the ledger entry were deleted
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocOutcome {
    pub doc_id: String,
    pub status: DocStatus,
    pub inserted: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestFailure {
    pub doc_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub documents_seen: usize,
    pub unchanged: usize,
    pub created: usize,
    pub updated: usize,
    pub documents_removed: usize,
    pub chunks_inserted: usize,
    pub chunks_removed: usize,
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    pub fn record(&mut self, outcome: &DocOutcome) {
        match outcome.status {
            DocStatus::Unchanged => self.unchanged += 1,
            DocStatus::Created => self.created += 1,
            DocStatus::Updated => self.updated += 1,
            DocStatus::Removed => self.documents_removed += 1,
        }
        self.chunks_inserted += outcome.inserted;
        self.chunks_removed += outcome.removed;
    }

    pub fn record_failure(&mut self, doc_id: impl Into<String>, reason: impl Into<String>) {
        self.failures.push(IngestFailure {
            doc_id: doc_id.into(),
            reason: reason.into(),
        });
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold another batch's counts into this one.
    pub fn merge(&mut self, other: IngestReport) {
        self.documents_seen += other.documents_seen;
        self.unchanged += other.unchanged;
        self.created += other.created;
        self.updated += other.updated;
        self.documents_removed += other.documents_removed;
        self.chunks_inserted += other.chunks_inserted;
        self.chunks_removed += other.chunks_removed;
        self.failures.extend(other.failures);
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} documents ({} new, {} updated, {} unchanged, {} removed, {} failed); \
             {} chunks inserted, {} removed",
            self.documents_seen,
            self.created,
            self.updated,
            self.unchanged,
            self.documents_removed,
            self.failures.len(),
            self.chunks_inserted,
            self.chunks_removed,
        )
    }
}
