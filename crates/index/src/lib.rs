//! Vector index, fingerprint ledger, embedders, and the Retriever.
//!
//! Backends:
//! - [`InMemoryVectorIndex`] / [`InMemoryDocumentStore`] for tests and ephemeral runs
//! - [`SqliteIndex`] (feature `sqlite`, on by default) for a durable single-file index

pub mod embedder;
pub mod memory;
pub mod retriever;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use embedder::{HashEmbedder, ProviderEmbedder};
pub use memory::{InMemoryDocumentStore, InMemoryVectorIndex};
pub use retriever::{DEFAULT_TOP_K, QueryResponse, Retriever, format_context};
pub use vector::cosine_similarity;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteIndex;
