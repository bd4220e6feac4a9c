//! The ingestion pipeline: chunk, fingerprint, and reconcile documents
//! against the fingerprint ledger and the vector index.
//!
//! Per document:
//! 1. Chunk the text and fingerprint every chunk.
//! 2. Diff the new fingerprint set against the ledger.
//! 3. Embed only the chunks the ledger has not seen.
//! 4. Upsert the new records, then delete the stale ones.
//! 5. Replace the ledger entry.
//!
//! Embedding is the only external call and happens before any write, so an
//! embedding failure leaves both the index and the ledger untouched. Every
//! write is idempotent, so re-running an interrupted reconciliation converges.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use docsage_core::document::{Chunk, Document};
use docsage_core::error::{EmbeddingError, IndexError, IngestError};
use docsage_core::event::{DomainEvent, EventBus};
use docsage_core::index::{DocumentStore, Embedder, EmbeddingRecord, VectorIndex};
use futures::StreamExt;
use futures::stream;
use tracing::{debug, info, warn};

use crate::chunker::Chunker;
use crate::fingerprint::fingerprint;
use crate::locks::DocLocks;
use crate::report::{DocOutcome, DocStatus, IngestReport};

#[derive(Clone)]
pub struct IngestionPipeline {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn DocumentStore>,
    locks: Arc<DocLocks>,
    concurrency: usize,
    events: Option<Arc<EventBus>>,
}

impl IngestionPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            chunker: Chunker::default(),
            embedder,
            index,
            store,
            locks: Arc::new(DocLocks::new()),
            concurrency: 4,
            events: None,
        }
    }

    /// Use a different chunker. Clones of a pipeline share their locks, so a
    /// per-source pipeline still serializes against the others.
    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    /// Documents reconciled concurrently within one batch.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Split a document into fingerprinted chunks.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.chunker
            .split(&document.text)
            .into_iter()
            .enumerate()
            .map(|(position, span)| Chunk {
                fingerprint: fingerprint(&document.doc_id, position, &span.text),
                doc_id: document.doc_id.clone(),
                position,
                offset: span.offset,
                text: span.text,
                metadata: document.metadata.clone(),
            })
            .collect()
    }

    /// Reconcile one document. Serialized per `doc_id`.
    pub async fn reconcile(&self, document: Document) -> Result<DocOutcome, IngestError> {
        validate(&document)?;
        let doc_id = document.doc_id.clone();
        let _guard = self.locks.acquire(&doc_id).await;
        let index_err = |source: IndexError| IngestError::Index {
            doc_id: doc_id.clone(),
            source,
        };

        let chunks = self.chunk(&document);
        let current: BTreeSet<String> = chunks.iter().map(|c| c.fingerprint.clone()).collect();

        let recorded = self.store.fingerprints(&doc_id).await.map_err(index_err)?;

        // Index entries missing from the ledger (an interrupted run) are stale too
        let indexed = self.index.fingerprints_for(&doc_id).await.map_err(index_err)?;

        let fresh: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| !recorded.contains(&c.fingerprint) || !indexed.contains(&c.fingerprint))
            .collect();
        let stale: Vec<String> = recorded
            .union(&indexed)
            .filter(|fp| !current.contains(*fp))
            .cloned()
            .collect();

        if fresh.is_empty() && stale.is_empty() && recorded == current {
            debug!(doc_id = %doc_id, chunks = current.len(), "Document unchanged");
            return Ok(DocOutcome {
                doc_id,
                status: DocStatus::Unchanged,
                inserted: 0,
                removed: 0,
            });
        }

        let records = self.embed_chunks(&doc_id, fresh).await?;
        let inserted = records.len();

        if !records.is_empty() {
            self.index.upsert(records).await.map_err(index_err)?;
        }
        if !stale.is_empty() {
            self.index.delete(&stale).await.map_err(index_err)?;
        }

        let status = if recorded.is_empty() && indexed.is_empty() {
            DocStatus::Created
        } else if current.is_empty() {
            DocStatus::Removed
        } else {
            DocStatus::Updated
        };

        self.store.replace(&doc_id, current).await.map_err(index_err)?;

        info!(
            doc_id = %doc_id,
            inserted,
            removed = stale.len(),
            status = ?status,
            "Document reconciled"
        );

        Ok(DocOutcome {
            doc_id,
            status,
            inserted,
            removed: stale.len(),
        })
    }

    async fn embed_chunks(
        &self,
        doc_id: &str,
        chunks: Vec<Chunk>,
    ) -> Result<Vec<EmbeddingRecord>, IngestError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let inputs: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&inputs)
            .await
            .map_err(|source| IngestError::Embedding {
                doc_id: doc_id.to_string(),
                source,
            })?;

        if vectors.len() != chunks.len() {
            return Err(IngestError::Embedding {
                doc_id: doc_id.to_string(),
                source: EmbeddingError::CountMismatch {
                    expected: chunks.len(),
                    actual: vectors.len(),
                },
            });
        }

        Ok(vectors
            .into_iter()
            .zip(chunks)
            .map(|(vector, chunk)| EmbeddingRecord { vector, chunk })
            .collect())
    }

    /// Reconcile a batch. Failures are recorded per document; the batch continues.
    ///
    /// Documents are pulled from the iterator lazily, at most `concurrency` in flight.
    pub async fn ingest<I>(&self, documents: I) -> IngestReport
    where
        I: IntoIterator<Item = Document>,
    {
        let mut report = IngestReport::default();
        let mut results = stream::iter(documents)
            .map(|doc| self.reconcile(doc))
            .buffer_unordered(self.concurrency);

        while let Some(result) = results.next().await {
            report.documents_seen += 1;
            self.record(&mut report, result);
        }

        info!(report = %report, "Ingestion batch complete");
        report
    }

    /// Reconcile the full document set: ingest every document, then remove
    /// ledger documents absent from the set.
    ///
    /// Documents are still pulled lazily; only their `doc_id`s are kept.
    pub async fn sync<I>(&self, documents: I) -> IngestReport
    where
        I: IntoIterator<Item = Document>,
    {
        let mut keep: HashSet<String> = HashSet::new();
        let seen = documents.into_iter().inspect(|d| {
            keep.insert(d.doc_id.clone());
        });

        let mut report = self.ingest(seen).await;
        report.merge(self.prune(&keep).await);
        report
    }

    /// Remove every ledger document whose `doc_id` is not in `keep`.
    pub async fn prune(&self, keep: &HashSet<String>) -> IngestReport {
        let mut report = IngestReport::default();
        let known = match self.store.doc_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Could not list ledger documents; skipping removals");
                report.record_failure("*", e.to_string());
                return report;
            }
        };

        for doc_id in known.into_iter().filter(|id| !keep.contains(id)) {
            let result = self.remove(&doc_id).await;
            self.record(&mut report, result);
        }
        report
    }

    /// Delete every chunk of a document and its ledger entry.
    pub async fn remove(&self, doc_id: &str) -> Result<DocOutcome, IngestError> {
        let _guard = self.locks.acquire(doc_id).await;
        let index_err = |source: IndexError| IngestError::Index {
            doc_id: doc_id.to_string(),
            source,
        };

        let mut stale = self.store.fingerprints(doc_id).await.map_err(index_err)?;
        stale.extend(self.index.fingerprints_for(doc_id).await.map_err(index_err)?);
        let stale: Vec<String> = stale.into_iter().collect();

        if !stale.is_empty() {
            self.index.delete(&stale).await.map_err(index_err)?;
        }
        self.store.remove(doc_id).await.map_err(index_err)?;

        info!(doc_id = %doc_id, removed = stale.len(), "Document removed");
        Ok(DocOutcome {
            doc_id: doc_id.to_string(),
            status: DocStatus::Removed,
            inserted: 0,
            removed: stale.len(),
        })
    }

    fn record(&self, report: &mut IngestReport, result: Result<DocOutcome, IngestError>) {
        match result {
            Ok(outcome) => {
                report.record(&outcome);
                self.publish(DomainEvent::DocumentIngested {
                    doc_id: outcome.doc_id,
                    inserted: outcome.inserted,
                    removed: outcome.removed,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                warn!(doc_id = %e.doc_id(), error = %e, "Document failed; ledger unchanged");
                report.record_failure(e.doc_id(), e.to_string());
                self.publish(DomainEvent::DocumentFailed {
                    doc_id: e.doc_id().to_string(),
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

fn validate(document: &Document) -> Result<(), IngestError> {
    if document.doc_id.trim().is_empty() {
        return Err(IngestError::MalformedDocument {
            doc_id: document.doc_id.clone(),
            reason: "doc_id must not be empty".into(),
        });
    }
    if document.text.contains('\0') {
        return Err(IngestError::MalformedDocument {
            doc_id: document.doc_id.clone(),
            reason: "text contains NUL bytes".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docsage_config::ChunkUnit;
    use docsage_core::filter::QueryFilter;
    use docsage_index::{HashEmbedder, InMemoryDocumentStore, InMemoryVectorIndex};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts embedded inputs and fails for texts containing "FAIL".
    struct CountingEmbedder {
        inner: HashEmbedder,
        embedded: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                inner: HashEmbedder::new(32),
                embedded: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model(&self) -> &str {
            "counting"
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if inputs.iter().any(|t| t.contains("FAIL")) {
                return Err(EmbeddingError::Request("endpoint down".into()));
            }
            self.embedded.fetch_add(inputs.len(), Ordering::SeqCst);
            self.inner.embed(inputs).await
        }
    }

    struct Fixture {
        pipeline: IngestionPipeline,
        embedder: Arc<CountingEmbedder>,
        index: Arc<InMemoryVectorIndex>,
        store: Arc<InMemoryDocumentStore>,
    }

    fn fixture() -> Fixture {
        let embedder = Arc::new(CountingEmbedder::new());
        let index = Arc::new(InMemoryVectorIndex::new());
        let store = Arc::new(InMemoryDocumentStore::new());
        let pipeline = IngestionPipeline::new(embedder.clone(), index.clone(), store.clone())
            .with_chunker(Chunker::new(24, 0, ChunkUnit::Characters));
        Fixture {
            pipeline,
            embedder,
            index,
            store,
        }
    }

    const LONG: &str = "The first paragraph talks about letters. The second one covers dates.";

    #[tokio::test]
    async fn unchanged_document_is_idempotent() {
        let f = fixture();
        let first = f.pipeline.reconcile(Document::new("a.md", LONG)).await.unwrap();
        assert_eq!(first.status, DocStatus::Created);
        let embedded = f.embedder.embedded.load(Ordering::SeqCst);
        let count = f.index.count().await.unwrap();
        let ledger = f.store.fingerprints("a.md").await.unwrap();

        let second = f.pipeline.reconcile(Document::new("a.md", LONG)).await.unwrap();
        assert_eq!(second.status, DocStatus::Unchanged);
        assert_eq!(f.embedder.embedded.load(Ordering::SeqCst), embedded);
        assert_eq!(f.index.count().await.unwrap(), count);
        assert_eq!(f.store.fingerprints("a.md").await.unwrap(), ledger);
    }

    #[tokio::test]
    async fn fully_changed_document_replaces_all_chunks() {
        let f = fixture();
        f.pipeline.reconcile(Document::new("a.md", LONG)).await.unwrap();
        let old = f.index.fingerprints_for("a.md").await.unwrap();

        let outcome = f
            .pipeline
            .reconcile(Document::new("a.md", "Completely different content now."))
            .await
            .unwrap();
        assert_eq!(outcome.status, DocStatus::Updated);

        let new = f.index.fingerprints_for("a.md").await.unwrap();
        assert!(old.is_disjoint(&new));
        let expected: BTreeSet<String> = f
            .pipeline
            .chunk(&Document::new("a.md", "Completely different content now."))
            .into_iter()
            .map(|c| c.fingerprint)
            .collect();
        assert_eq!(new, expected);
        assert_eq!(f.store.fingerprints("a.md").await.unwrap(), expected);
    }

    #[tokio::test]
    async fn partial_change_embeds_only_new_chunks() {
        let f = fixture();
        let doc = "alpha alpha alpha alpha beta beta beta beta";
        f.pipeline.reconcile(Document::new("a.md", doc)).await.unwrap();
        let before = f.embedder.embedded.load(Ordering::SeqCst);

        let edited = "alpha alpha alpha alpha gamma gamma gamma";
        let outcome = f.pipeline.reconcile(Document::new("a.md", edited)).await.unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.removed, 1);
        assert_eq!(f.embedder.embedded.load(Ordering::SeqCst), before + 1);
    }

    #[tokio::test]
    async fn embedding_failure_leaves_prior_state() {
        let f = fixture();
        f.pipeline.reconcile(Document::new("a.md", LONG)).await.unwrap();
        let ledger = f.store.fingerprints("a.md").await.unwrap();
        let indexed = f.index.fingerprints_for("a.md").await.unwrap();

        let err = f
            .pipeline
            .reconcile(Document::new("a.md", "FAIL this time"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Embedding { .. }));
        assert_eq!(f.store.fingerprints("a.md").await.unwrap(), ledger);
        assert_eq!(f.index.fingerprints_for("a.md").await.unwrap(), indexed);
    }

    #[tokio::test]
    async fn batch_continues_past_failures() {
        let f = fixture();
        let report = f
            .pipeline
            .ingest(vec![
                Document::new("good.md", "Letters must include a date."),
                Document::new("bad.md", "FAIL"),
                Document::new("", "no id"),
                Document::new("also-good.md", "Signatures go at the end."),
            ])
            .await;

        assert_eq!(report.documents_seen, 4);
        assert_eq!(report.created, 2);
        assert_eq!(report.failures.len(), 2);
        assert!(f.store.fingerprints("bad.md").await.unwrap().is_empty());
        assert_eq!(f.store.doc_ids().await.unwrap(), vec!["also-good.md", "good.md"]);
    }

    #[tokio::test]
    async fn empty_document_removes_prior_chunks() {
        let f = fixture();
        f.pipeline.reconcile(Document::new("a.md", LONG)).await.unwrap();
        let outcome = f.pipeline.reconcile(Document::new("a.md", "   ")).await.unwrap();
        assert_eq!(outcome.status, DocStatus::Removed);
        assert_eq!(f.index.count().await.unwrap(), 0);
        assert!(f.store.doc_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sync_removes_missing_documents() {
        let f = fixture();
        f.pipeline
            .ingest(vec![Document::new("keep.md", LONG), Document::new("gone.md", LONG)])
            .await;

        let report = f.pipeline.sync(vec![Document::new("keep.md", LONG)]).await;
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.documents_removed, 1);
        assert!(f.index.fingerprints_for("gone.md").await.unwrap().is_empty());
        assert_eq!(f.store.doc_ids().await.unwrap(), vec!["keep.md"]);
    }

    #[tokio::test]
    async fn sync_prunes_against_a_lazy_source() {
        let f = fixture();
        f.pipeline.ingest(vec![Document::new("stale.md", LONG)]).await;

        let pulled = std::cell::Cell::new(0);
        let source = (0..3).map(|i| {
            pulled.set(pulled.get() + 1);
            Document::new(format!("doc{i}.md"), LONG)
        });
        let report = f.pipeline.sync(source).await;

        assert_eq!(pulled.get(), 3);
        assert_eq!(report.created, 3);
        assert_eq!(report.documents_removed, 1);
        let mut ids = f.store.doc_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["doc0.md", "doc1.md", "doc2.md"]);
    }

    #[tokio::test]
    async fn orphaned_index_entries_are_cleaned_up() {
        let f = fixture();
        f.pipeline.reconcile(Document::new("a.md", LONG)).await.unwrap();
        // Simulate a crash after upsert but before the ledger was written
        f.store.remove("a.md").await.unwrap();

        f.pipeline
            .reconcile(Document::new("a.md", "Short replacement."))
            .await
            .unwrap();
        let indexed = f.index.fingerprints_for("a.md").await.unwrap();
        assert_eq!(indexed, f.store.fingerprints("a.md").await.unwrap());
        assert_eq!(indexed.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_reconciliations_of_one_doc_converge() {
        let f = fixture();
        let pipeline = f.pipeline.clone().with_concurrency(8);
        let docs = (0..8).map(|i| {
            let text = if i % 2 == 0 { LONG } else { "Other text entirely." };
            Document::new("a.md", text)
        });
        let report = pipeline.ingest(docs).await;
        assert!(report.is_success());

        // Whatever ran last, index and ledger agree
        assert_eq!(
            f.index.fingerprints_for("a.md").await.unwrap(),
            f.store.fingerprints("a.md").await.unwrap()
        );
    }

    #[tokio::test]
    async fn events_are_published() {
        let f = fixture();
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let pipeline = f.pipeline.clone().with_events(bus);

        pipeline.ingest(vec![Document::new("a.md", "FAIL")]).await;
        let event = rx.recv().await.unwrap();
        assert!(matches!(&*event, DomainEvent::DocumentFailed { doc_id, .. } if doc_id == "a.md"));
    }

    #[tokio::test]
    async fn private_flag_reaches_index() {
        let f = fixture();
        f.pipeline
            .reconcile(Document::new("secret.md", "Hidden letter.").private(true))
            .await
            .unwrap();
        let hits = f
            .index
            .search(&[0.0; 32], &QueryFilter::public_only(), 10)
            .await
            .unwrap();
        assert!(hits.is_empty());
        let hits = f.index.search(&[0.0; 32], &QueryFilter::match_all(), 10).await.unwrap();
        assert!(hits[0].chunk.is_private());
    }
}
