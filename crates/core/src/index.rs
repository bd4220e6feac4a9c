//! Storage contracts: embedding model, vector index, and fingerprint ledger.
//!
//! The ingestion pipeline writes through [`VectorIndex`] and
//! [`DocumentStore`]; the retriever reads through [`VectorIndex`] and
//! [`Embedder`]. Implementations must be safe to share across tasks: queries
//! may run while other documents are being reconciled.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::Chunk;
use crate::error::{EmbeddingError, IndexError};
use crate::filter::QueryFilter;

/// A chunk together with its embedding vector.
///
/// The index stores the pair as one unit, so readers never observe a chunk
/// without its vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

impl EmbeddingRecord {
    pub fn fingerprint(&self) -> &str {
        &self.chunk.fingerprint
    }
}

/// One similarity-search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    /// Raw similarity (cosine for the bundled backends)
    pub score: f32,
}

/// Turns text into vectors. Ingestion and retrieval must share one model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifies the model; stored alongside vectors for diagnostics.
    fn model(&self) -> &str;

    /// Embed a batch. Returns exactly one vector per input, in order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single query string.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(&[query.to_string()]).await?;
        match vectors.len() {
            1 => Ok(vectors.remove(0)),
            actual => Err(EmbeddingError::CountMismatch {
                expected: 1,
                actual,
            }),
        }
    }
}

/// Nearest-neighbour storage over embedding records.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Insert records. Re-inserting a fingerprint replaces it.
    async fn upsert(&self, records: Vec<EmbeddingRecord>) -> Result<(), IndexError>;

    /// Remove records by fingerprint. Unknown fingerprints are ignored.
    async fn delete(&self, fingerprints: &[String]) -> Result<(), IndexError>;

    /// Top-`top_k` records admitted by `filter`, by descending similarity.
    async fn search(
        &self,
        query: &[f32],
        filter: &QueryFilter,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, IndexError>;

    /// Fingerprints currently stored for one document.
    async fn fingerprints_for(&self, doc_id: &str) -> Result<BTreeSet<String>, IndexError>;

    /// Total number of stored records.
    async fn count(&self) -> Result<usize, IndexError>;
}

/// The fingerprint ledger: `doc_id` → chunk fingerprints currently indexed.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// The recorded set; empty for an unknown document.
    async fn fingerprints(&self, doc_id: &str) -> Result<BTreeSet<String>, IndexError>;

    /// Replace a document's set. An empty set removes the entry.
    async fn replace(&self, doc_id: &str, fingerprints: BTreeSet<String>)
    -> Result<(), IndexError>;

    async fn remove(&self, doc_id: &str) -> Result<(), IndexError>;

    /// Every document with a ledger entry.
    async fn doc_ids(&self) -> Result<Vec<String>, IndexError>;
}
