//! Document, Chunk, and SourceNode domain types.
//!
//! A [`Document`] is raw content with a stable `doc_id`. The ingestion
//! pipeline splits it into [`Chunk`]s, each carrying a content fingerprint
//! and the metadata the query filter relies on. A chunk surfaced as evidence
//! for an answer becomes a [`SourceNode`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata attached to a document by its source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Which configured source produced the document (e.g. "local-docs")
    #[serde(default)]
    pub origin: String,

    /// Private documents are only retrievable through an allow-list
    #[serde(default)]
    pub private: bool,

    /// Resolvable location of the original content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Display name shown with citations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Source-specific extras, passed through to citations
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Raw content with a stable identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(doc_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            text: text.into(),
            metadata: DocumentMetadata::default(),
        }
    }

    /// Mark the document as private (allow-list only).
    pub fn private(mut self, private: bool) -> Self {
        self.metadata.private = private;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.metadata.origin = origin.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.metadata.url = Some(url.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.metadata.file_name = Some(file_name.into());
        self
    }
}

/// A contiguous slice of a document's text.
///
/// Never mutated; re-ingestion replaces chunks wholesale by fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic content fingerprint (hex SHA-256)
    pub fingerprint: String,

    /// Owning document
    pub doc_id: String,

    /// Zero-based index in the document's chunk sequence
    pub position: usize,

    /// Byte offset of the chunk's first character in the document text
    pub offset: usize,

    pub text: String,

    /// Inherited from the document
    pub metadata: DocumentMetadata,
}

impl Chunk {
    pub fn is_private(&self) -> bool {
        self.metadata.private
    }
}

/// A chunk surfaced as evidence for an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceNode {
    /// The chunk fingerprint
    pub id: String,

    /// Originating metadata (`doc_id`, `file_name`, `private`, ...)
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Relevance in [0, 1]
    pub score: f32,

    pub text: String,

    #[serde(default)]
    pub url: Option<String>,
}

impl SourceNode {
    /// Build a citation from a chunk and its raw similarity score.
    pub fn from_chunk(chunk: &Chunk, score: f32) -> Self {
        let meta = &chunk.metadata;
        let mut metadata = meta.extra.clone();
        metadata.insert("doc_id".into(), chunk.doc_id.clone().into());
        metadata.insert("private".into(), meta.private.into());
        metadata.insert("position".into(), chunk.position.into());
        if !meta.origin.is_empty() {
            metadata.insert("origin".into(), meta.origin.clone().into());
        }
        let file_name = meta.file_name.clone().unwrap_or_else(|| chunk.doc_id.clone());
        metadata.insert("file_name".into(), file_name.into());

        Self {
            id: chunk.fingerprint.clone(),
            metadata,
            score: clamp_score(score),
            text: chunk.text.clone(),
            url: meta.url.clone(),
        }
    }

    /// The `doc_id` this node was drawn from.
    pub fn doc_id(&self) -> Option<&str> {
        self.metadata.get("doc_id").and_then(|v| v.as_str())
    }
}

/// Clamp a similarity to the [0, 1] relevance range. NaN maps to 0.
pub fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}
