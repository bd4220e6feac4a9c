//! In-memory vector index and fingerprint ledger.
//!
//! Useful for tests and ephemeral sessions. Search is brute-force cosine
//! similarity over every stored record.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use docsage_core::error::IndexError;
use docsage_core::filter::QueryFilter;
use docsage_core::index::{DocumentStore, EmbeddingRecord, SearchHit, VectorIndex};
use tokio::sync::RwLock;

use crate::vector;

/// Records keyed by fingerprint.
pub struct InMemoryVectorIndex {
    records: Arc<RwLock<HashMap<String, EmbeddingRecord>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, records: Vec<EmbeddingRecord>) -> Result<(), IndexError> {
        let mut stored = self.records.write().await;
        for record in records {
            stored.insert(record.chunk.fingerprint.clone(), record);
        }
        Ok(())
    }

    async fn delete(&self, fingerprints: &[String]) -> Result<(), IndexError> {
        let mut stored = self.records.write().await;
        for fp in fingerprints {
            stored.remove(fp);
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        filter: &QueryFilter,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let stored = self.records.read().await;
        Ok(vector::rank(stored.values(), query, filter, top_k))
    }

    async fn fingerprints_for(&self, doc_id: &str) -> Result<BTreeSet<String>, IndexError> {
        let stored = self.records.read().await;
        Ok(stored
            .values()
            .filter(|r| r.chunk.doc_id == doc_id)
            .map(|r| r.chunk.fingerprint.clone())
            .collect())
    }

    async fn count(&self) -> Result<usize, IndexError> {
        Ok(self.records.read().await.len())
    }
}

/// Ledger kept in a map.
pub struct InMemoryDocumentStore {
    ledger: Arc<RwLock<HashMap<String, BTreeSet<String>>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn fingerprints(&self, doc_id: &str) -> Result<BTreeSet<String>, IndexError> {
        Ok(self
            .ledger
            .read()
            .await
            .get(doc_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace(
        &self,
        doc_id: &str,
        fingerprints: BTreeSet<String>,
    ) -> Result<(), IndexError> {
        let mut ledger = self.ledger.write().await;
        if fingerprints.is_empty() {
            ledger.remove(doc_id);
        } else {
            ledger.insert(doc_id.to_string(), fingerprints);
        }
        Ok(())
    }

    async fn remove(&self, doc_id: &str) -> Result<(), IndexError> {
        self.ledger.write().await.remove(doc_id);
        Ok(())
    }

    async fn doc_ids(&self) -> Result<Vec<String>, IndexError> {
        let mut ids: Vec<String> = self.ledger.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::tests::record;

    #[tokio::test]
    async fn upsert_is_idempotent_by_fingerprint() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(vec![record("a", "d", false, vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert(vec![record("a", "d", false, vec![1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_ignores_unknown() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(vec![
                record("a", "d", false, vec![1.0]),
                record("b", "d", false, vec![1.0]),
            ])
            .await
            .unwrap();
        index
            .delete(&["a".to_string(), "zzz".to_string()])
            .await
            .unwrap();
        let fps = index.fingerprints_for("d").await.unwrap();
        assert_eq!(fps.into_iter().collect::<Vec<_>>(), vec!["b"]);
    }

    #[tokio::test]
    async fn search_respects_filter() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(vec![
                record("p", "public.md", false, vec![1.0, 0.0]),
                record("s", "secret.md", true, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();
        let hits = index
            .search(&[1.0, 0.0], &QueryFilter::public_only(), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.fingerprint, "p");
    }

    #[tokio::test]
    async fn ledger_replace_and_remove() {
        let store = InMemoryDocumentStore::new();
        assert!(store.fingerprints("d").await.unwrap().is_empty());

        store
            .replace("d", ["x".to_string(), "y".to_string()].into())
            .await
            .unwrap();
        assert_eq!(store.fingerprints("d").await.unwrap().len(), 2);
        assert_eq!(store.doc_ids().await.unwrap(), vec!["d"]);

        store.replace("d", BTreeSet::new()).await.unwrap();
        assert!(store.doc_ids().await.unwrap().is_empty());

        store.replace("e", ["z".to_string()].into()).await.unwrap();
        store.remove("e").await.unwrap();
        assert!(store.fingerprints("e").await.unwrap().is_empty());
    }
}
