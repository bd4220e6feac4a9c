use std::sync::Arc;

use docsage_core::document::{Chunk, Document};
use docsage_core::index::{Embedder, EmbeddingRecord, VectorIndex};
use docsage_index::{HashEmbedder, InMemoryVectorIndex, Retriever};

/// A retriever over one public and one private letter document.
pub(crate) async fn seeded_retriever() -> Arc<Retriever> {
    let index = Arc::new(InMemoryVectorIndex::new());
    let embedder = Arc::new(HashEmbedder::default());

    let docs = [
        Document::new("letters.md", "Letters must include a date and signature."),
        Document::new("secret.md", "Secret letters must include a wax seal.").private(true),
    ];
    let mut records = Vec::new();
    for doc in docs {
        records.push(EmbeddingRecord {
            vector: embedder.embed_query(&doc.text).await.unwrap(),
            chunk: Chunk {
                fingerprint: format!("fp-{}", doc.doc_id),
                doc_id: doc.doc_id.clone(),
                position: 0,
                offset: 0,
                text: doc.text.clone(),
                metadata: doc.metadata,
            },
        });
    }
    index.upsert(records).await.unwrap();

    Arc::new(Retriever::new(index, embedder))
}
