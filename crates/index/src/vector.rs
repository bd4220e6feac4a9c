//! Vector similarity and brute-force ranking.
//!
//! Both bundled index backends score candidates in Rust: the in-memory index
//! over everything it holds, the SQLite index over the rows its filter admits.

use std::cmp::Ordering;

use docsage_core::filter::QueryFilter;
use docsage_core::index::{EmbeddingRecord, SearchHit};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 for empty, mismatched, or zero-magnitude input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank records admitted by `filter` against `query`, best first.
///
/// Ties are broken by fingerprint so results are deterministic.
pub fn rank<'a, I>(records: I, query: &[f32], filter: &QueryFilter, top_k: usize) -> Vec<SearchHit>
where
    I: IntoIterator<Item = &'a EmbeddingRecord>,
{
    let mut scored: Vec<(f32, &EmbeddingRecord)> = records
        .into_iter()
        .filter(|r| filter.matches(&r.chunk))
        .map(|r| (cosine_similarity(&r.vector, query), r))
        .collect();

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.fingerprint().cmp(b.1.fingerprint()))
    });
    scored.truncate(top_k);
    scored
        .into_iter()
        .map(|(score, r)| SearchHit {
            chunk: r.chunk.clone(),
            score,
        })
        .collect()
}

/// Serialize an embedding vector to little-endian bytes.
pub fn to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Inverse of [`to_blob`]. Trailing bytes that don't form a full f32 are dropped.
pub fn from_blob(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use docsage_core::document::{Chunk, Document};
    use docsage_core::filter::QueryFilterBuilder;

    pub(crate) fn record(fp: &str, doc_id: &str, private: bool, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            vector,
            chunk: Chunk {
                fingerprint: fp.into(),
                doc_id: doc_id.into(),
                position: 0,
                offset: 0,
                text: format!("text of {fp}"),
                metadata: Document::new(doc_id, "").private(private).metadata,
            },
        }
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        assert!(cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn cosine_known_value() {
        // 1 / sqrt(2)
        let sim = cosine_similarity(&[1.0, 1.0], &[1.0, 0.0]);
        assert!((sim - 0.7071).abs() < 0.001);
    }

    #[test]
    fn rank_orders_and_truncates() {
        let records = vec![
            record("a", "d1", false, vec![0.0, 1.0, 0.0]),
            record("b", "d1", false, vec![1.0, 0.0, 0.0]),
            record("c", "d2", false, vec![0.5, 0.5, 0.0]),
        ];
        let hits = rank(&records, &[1.0, 0.0, 0.0], &QueryFilter::match_all(), 2);
        let ids: Vec<_> = hits.iter().map(|h| h.chunk.fingerprint.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn rank_applies_filter() {
        let records = vec![
            record("pub", "public.md", false, vec![1.0, 0.0]),
            record("sec", "secret.md", true, vec![1.0, 0.0]),
        ];
        let filter = QueryFilterBuilder::default().build().unwrap();
        let hits = rank(&records, &[1.0, 0.0], &filter, 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.doc_id, "public.md");
    }

    #[test]
    fn blob_conversion_preserves_values() {
        let v = vec![0.25, -1.5, 3.0];
        assert_eq!(from_blob(&to_blob(&v)), v);
    }
}
