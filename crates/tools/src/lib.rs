//! Tools available to the docsage agent.
//!
//! - `knowledge_base`: the Retriever, scoped by the turn's visibility filter
//! - `web_search`: an HTTP JSON search endpoint
//! - `document_generator`: writes markdown/HTML files and returns their URL
//!
//! Tools are resolved from configuration through [`ToolFactories`].

pub mod document_generator;
pub mod knowledge_base;
pub mod loader;
pub mod web_search;

#[cfg(test)]
mod test_support;

pub use document_generator::DocumentGeneratorTool;
pub use knowledge_base::KnowledgeBaseTool;
pub use loader::{LoadedTools, ToolDeps, ToolFactories, ToolFactory};
pub use web_search::WebSearchTool;
