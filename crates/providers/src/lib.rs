//! LLM Provider implementations for docsage.
//!
//! All providers implement the `docsage_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod openai_compat;
pub mod retry;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::RetryingProvider;
pub use router::ProviderRouter;
