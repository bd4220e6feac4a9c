//! Embedding models.
//!
//! - [`HashEmbedder`]: deterministic, offline, content-aware vectors built
//!   from word and character-trigram hashes. Good enough for development,
//!   tests, and small corpora.
//! - [`ProviderEmbedder`]: delegates to an LLM provider's embeddings endpoint.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use docsage_core::error::EmbeddingError;
use docsage_core::index::Embedder;
use docsage_core::provider::{EmbeddingRequest, Provider};
use tracing::debug;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "what", "how", "who", "does", "did",
];

/// Feature-hashing embedder over words and character trigrams.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    stop_words: HashSet<&'static str>,
}

impl HashEmbedder {
    pub const MODEL: &'static str = "hash-trigram-v1";

    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            stop_words: STOP_WORDS.iter().copied().collect(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        let lower = text.to_lowercase();

        let mut word_freq: HashMap<&str, u32> = HashMap::new();
        for word in lower
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| w.chars().count() > 2 && !self.stop_words.contains(w))
        {
            *word_freq.entry(word).or_insert(0) += 1;
        }

        for (word, freq) in &word_freq {
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                let hash = trigram
                    .bytes()
                    .fold(0u64, |acc, b| acc.wrapping_mul(37).wrapping_add(b as u64));
                embedding[(hash as usize) % self.dimensions] += (*freq as f32).sqrt();
            }

            let hash = word
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            embedding[(hash as usize) % self.dimensions] += *freq as f32;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }
        embedding
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model(&self) -> &str {
        Self::MODEL
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(inputs.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// Embeds through a provider's embeddings endpoint, in batches.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
    batch_size: usize,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            batch_size: 64,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(inputs.len());

        for batch in inputs.chunks(self.batch_size) {
            let response = self
                .provider
                .embed(EmbeddingRequest {
                    model: self.model.clone(),
                    inputs: batch.to_vec(),
                })
                .await
                .map_err(|e| EmbeddingError::Request(e.to_string()))?;

            if response.embeddings.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: batch.len(),
                    actual: response.embeddings.len(),
                });
            }
            vectors.extend(response.embeddings);
        }

        // Every vector must share the first one's width
        if let Some(expected) = vectors.first().map(Vec::len) {
            if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                return Err(EmbeddingError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }

        debug!(
            provider = self.provider.name(),
            model = %self.model,
            count = vectors.len(),
            "Embedded batch"
        );
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::cosine_similarity;
    use docsage_core::error::ProviderError;
    use docsage_core::provider::{EmbeddingResponse, ProviderRequest, ProviderResponse};

    #[tokio::test]
    async fn hash_embeddings_are_unit_length() {
        let embedder = HashEmbedder::new(128);
        let v = embedder.embed_query("hello world of embeddings").await.unwrap();
        assert_eq!(v.len(), 128);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn hash_embeddings_are_deterministic() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed_query("Letter to Alice").await.unwrap();
        let b = embedder.embed_query("Letter to Alice").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn related_text_scores_higher() {
        let embedder = HashEmbedder::default();
        let query = embedder.embed_query("letters about gardening").await.unwrap();
        let related = embedder
            .embed_query("My letters describe the gardening season.")
            .await
            .unwrap();
        let unrelated = embedder
            .embed_query("Quarterly revenue grew in the finance department.")
            .await
            .unwrap();
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn stop_words_only_yields_zero_vector() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed_query("the of and").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    struct EchoEmbeddings {
        drop_one: bool,
    }

    #[async_trait]
    impl Provider for EchoEmbeddings {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::NotConfigured("no chat".into()))
        }

        async fn embed(
            &self,
            request: EmbeddingRequest,
        ) -> Result<EmbeddingResponse, ProviderError> {
            let mut embeddings: Vec<Vec<f32>> = request
                .inputs
                .iter()
                .map(|s| vec![s.len() as f32, 1.0])
                .collect();
            if self.drop_one {
                embeddings.pop();
            }
            Ok(EmbeddingResponse {
                embeddings,
                model: request.model,
            })
        }
    }

    #[tokio::test]
    async fn provider_embedder_batches_in_order() {
        let embedder = ProviderEmbedder::new(Arc::new(EchoEmbeddings { drop_one: false }), "m")
            .with_batch_size(2);
        let inputs: Vec<String> = ["a", "bb", "ccc"].iter().map(|s| s.to_string()).collect();
        let vectors = embedder.embed(&inputs).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[2][0], 3.0);
    }

    #[tokio::test]
    async fn provider_embedder_detects_count_mismatch() {
        let embedder = ProviderEmbedder::new(Arc::new(EchoEmbeddings { drop_one: true }), "m");
        let err = embedder.embed(&["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::CountMismatch { expected: 1, actual: 0 }));
    }
}
