//! # docsage Core
//!
//! Domain types, traits, and error definitions for the docsage retrieval
//! and agent engine. This crate performs **no I/O**; it defines the domain
//! model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (LLM provider, embedding model, vector index,
//! document store, tool) is a trait here. Implementations live in their
//! respective crates, so:
//! - Backends are swapped via configuration
//! - Tests run against in-memory and scripted implementations
//! - All crates depend inward on core

pub mod document;
pub mod error;
pub mod event;
pub mod filter;
pub mod index;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use document::{Chunk, Document, DocumentMetadata, SourceNode};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use filter::{QueryFilter, QueryFilterBuilder, VisibilityPolicy};
pub use index::{DocumentStore, Embedder, EmbeddingRecord, SearchHit, VectorIndex};
pub use message::{Attachment, ChatMessage, Conversation, ConversationId, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use tool::{Tool, ToolCall, ToolContext, ToolRegistry, ToolResult};
