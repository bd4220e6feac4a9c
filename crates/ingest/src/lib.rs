//! Document ingestion for docsage.
//!
//! Documents are chunked, fingerprinted, and reconciled against the
//! fingerprint ledger so the vector index always holds exactly the chunks
//! implied by the current document set.

pub mod chunker;
pub mod fingerprint;
pub mod locks;
pub mod pipeline;
pub mod report;

pub use chunker::{Chunker, Span, estimate_tokens};
pub use fingerprint::fingerprint;
pub use pipeline::IngestionPipeline;
pub use report::{DocOutcome, DocStatus, IngestFailure, IngestReport};
