//! The Retriever: similarity search plus optional answer synthesis.
//!
//! Queries are embedded with the same [`Embedder`] used at ingestion, searched
//! in the [`VectorIndex`] under a [`QueryFilter`], and returned as
//! [`SourceNode`]s ordered by descending score. An empty result is a valid
//! outcome, never an error.

use std::sync::Arc;

use docsage_core::document::SourceNode;
use docsage_core::filter::QueryFilter;
use docsage_core::index::{Embedder, VectorIndex};
use docsage_core::message::ChatMessage;
use docsage_core::provider::{Provider, ProviderRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Result count used when the caller passes `None` or `0`.
pub const DEFAULT_TOP_K: usize = 4;

/// Answer returned when no evidence passed the filter.
pub const NO_EVIDENCE_ANSWER: &str =
    "I could not find anything relevant to that question in the knowledge base.";

const SYNTHESIS_PROMPT: &str = "Answer the question using only the context below. \
If the context does not contain the answer, say so.";

/// Plain query result: a synthesized answer plus the evidence behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub nodes: Vec<SourceNode>,
}

struct Synthesizer {
    provider: Arc<dyn Provider>,
    model: String,
}

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    min_score: f32,
    synthesizer: Option<Synthesizer>,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index,
            embedder,
            top_k: DEFAULT_TOP_K,
            min_score: 0.0,
            synthesizer: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = if top_k == 0 { DEFAULT_TOP_K } else { top_k };
        self
    }

    /// Drop nodes scoring below `min_score` (after clamping to [0, 1]).
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Enable [`query`](Self::query) by supplying a provider for synthesis.
    pub fn with_synthesizer(mut self, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        self.synthesizer = Some(Synthesizer {
            provider,
            model: model.into(),
        });
        self
    }

    pub fn embedder_model(&self) -> &str {
        self.embedder.model()
    }

    /// Search for nodes relevant to `query` that `filter` admits.
    pub async fn retrieve(
        &self,
        query: &str,
        filter: &QueryFilter,
        top_k: Option<usize>,
    ) -> docsage_core::Result<Vec<SourceNode>> {
        let top_k = match top_k {
            Some(k) if k > 0 => k,
            _ => self.top_k,
        };

        let vector = self.embedder.embed_query(query).await?;
        let hits = self.index.search(&vector, filter, top_k).await?;

        let nodes: Vec<SourceNode> = hits
            .iter()
            .map(|hit| SourceNode::from_chunk(&hit.chunk, hit.score))
            .filter(|node| node.score >= self.min_score)
            .collect();

        debug!(
            index = self.index.name(),
            filter = %filter,
            top_k,
            hits = nodes.len(),
            "Retrieved nodes"
        );
        Ok(nodes)
    }

    /// Retrieve, then synthesize a direct answer from the retrieved nodes.
    pub async fn query(
        &self,
        query: &str,
        filter: &QueryFilter,
        top_k: Option<usize>,
    ) -> docsage_core::Result<QueryResponse> {
        let nodes = self.retrieve(query, filter, top_k).await?;
        if nodes.is_empty() {
            return Ok(QueryResponse {
                answer: NO_EVIDENCE_ANSWER.to_string(),
                nodes,
            });
        }

        let synth = self.synthesizer.as_ref().ok_or_else(|| docsage_core::Error::Config {
            message: "Retriever has no synthesis provider configured".into(),
        })?;

        let request = ProviderRequest::new(
            synth.model.clone(),
            vec![
                ChatMessage::system(format!("{SYNTHESIS_PROMPT}\n\n{}", format_context(&nodes))),
                ChatMessage::user(query),
            ],
        );
        let response = synth.provider.complete(request).await?;

        info!(nodes = nodes.len(), provider = synth.provider.name(), "Synthesized answer");
        Ok(QueryResponse {
            answer: response.message.content,
            nodes,
        })
    }
}

/// Render nodes as a numbered context block for a prompt.
pub fn format_context(nodes: &[SourceNode]) -> String {
    if nodes.is_empty() {
        return "No relevant context was found.".to_string();
    }

    let mut out = String::from("Context:\n");
    for (i, node) in nodes.iter().enumerate() {
        let name = node
            .metadata
            .get("file_name")
            .and_then(|v| v.as_str())
            .or_else(|| node.doc_id())
            .unwrap_or(&node.id);
        out.push_str(&format!(
            "\n[{}] {} (score {:.2})\n{}\n",
            i + 1,
            name,
            node.score,
            node.text.trim()
        ));
    }
    out
}
