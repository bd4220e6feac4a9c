//! Declarative tool loading.
//!
//! Each tool identifier maps to a factory function. [`ToolFactories::load`]
//! resolves the configured `[[tools]]` entries once at startup into a fixed
//! [`ToolRegistry`]. An unknown identifier or a failing factory is logged and
//! reported; the remaining tools still load.

use std::collections::BTreeMap;
use std::sync::Arc;

use docsage_config::ToolConfig;
use docsage_core::error::ToolError;
use docsage_core::tool::{Tool, ToolRegistry};
use docsage_index::Retriever;
use tracing::{debug, info, warn};

use crate::document_generator::DocumentGeneratorTool;
use crate::knowledge_base::KnowledgeBaseTool;
use crate::web_search::WebSearchTool;

/// Shared collaborators a factory may need.
#[derive(Clone, Default)]
pub struct ToolDeps {
    pub retriever: Option<Arc<Retriever>>,
}

impl ToolDeps {
    pub fn with_retriever(retriever: Arc<Retriever>) -> Self {
        Self {
            retriever: Some(retriever),
        }
    }
}

pub type ToolFactory = fn(&ToolConfig, &ToolDeps) -> Result<Box<dyn Tool>, ToolError>;

/// The result of resolving tool configuration.
pub struct LoadedTools {
    pub registry: ToolRegistry,
    pub failures: Vec<ToolError>,
}

pub struct ToolFactories {
    factories: BTreeMap<String, ToolFactory>,
}

impl ToolFactories {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Factories for every built-in tool.
    pub fn builtin() -> Self {
        let mut factories = Self::empty();
        factories.register(KnowledgeBaseTool::ID, knowledge_base_factory);
        factories.register(WebSearchTool::ID, web_search_factory);
        factories.register(DocumentGeneratorTool::ID, document_generator_factory);
        factories
    }

    pub fn register(&mut self, id: impl Into<String>, factory: ToolFactory) {
        self.factories.insert(id.into(), factory);
    }

    pub fn ids(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Resolve every enabled entry.
    pub fn load(&self, configs: &[ToolConfig], deps: &ToolDeps) -> LoadedTools {
        let mut registry = ToolRegistry::new();
        let mut failures = Vec::new();

        for config in configs {
            if !config.enabled {
                debug!(tool = %config.id, "Tool disabled, skipping");
                continue;
            }

            let Some(factory) = self.factories.get(&config.id) else {
                warn!(
                    tool = %config.id,
                    known = ?self.ids(),
                    "Unknown tool identifier, skipping"
                );
                failures.push(ToolError::UnknownTool(config.id.clone()));
                continue;
            };

            match factory(config, deps) {
                Ok(tool) => {
                    debug!(tool = %config.id, "Tool loaded");
                    registry.register(tool);
                }
                Err(e) => {
                    warn!(tool = %config.id, error = %e, "Tool failed to load, skipping");
                    failures.push(e);
                }
            }
        }

        info!(
            loaded = registry.len(),
            failed = failures.len(),
            tools = ?registry.names(),
            "Tools resolved"
        );
        LoadedTools { registry, failures }
    }
}

impl Default for ToolFactories {
    fn default() -> Self {
        Self::builtin()
    }
}

fn knowledge_base_factory(config: &ToolConfig, deps: &ToolDeps) -> Result<Box<dyn Tool>, ToolError> {
    let retriever = deps.retriever.clone().ok_or_else(|| ToolError::Factory {
        tool_id: config.id.clone(),
        reason: "no retriever available".into(),
    })?;
    Ok(Box::new(KnowledgeBaseTool::new(retriever)))
}

fn web_search_factory(config: &ToolConfig, _deps: &ToolDeps) -> Result<Box<dyn Tool>, ToolError> {
    Ok(Box::new(WebSearchTool::from_config(config)?))
}

fn document_generator_factory(
    config: &ToolConfig,
    _deps: &ToolDeps,
) -> Result<Box<dyn Tool>, ToolError> {
    Ok(Box::new(DocumentGeneratorTool::from_config(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seeded_retriever;

    #[tokio::test]
    async fn loads_builtin_tools() {
        let deps = ToolDeps::with_retriever(seeded_retriever().await);
        let loaded = ToolFactories::builtin().load(
            &[
                ToolConfig::new("knowledge_base"),
                ToolConfig::new("document_generator"),
            ],
            &deps,
        );
        assert!(loaded.failures.is_empty());
        assert_eq!(loaded.registry.names(), vec!["document_generator", "knowledge_base"]);
    }

    #[tokio::test]
    async fn unknown_and_failing_tools_do_not_block_others() {
        let deps = ToolDeps::with_retriever(seeded_retriever().await);
        let loaded = ToolFactories::builtin().load(
            &[
                ToolConfig::new("telepathy"),
                // Missing its required endpoint
                ToolConfig::new("web_search"),
                ToolConfig::new("knowledge_base"),
            ],
            &deps,
        );

        assert_eq!(loaded.registry.names(), vec!["knowledge_base"]);
        assert_eq!(loaded.failures.len(), 2);
        assert!(matches!(&loaded.failures[0], ToolError::UnknownTool(id) if id == "telepathy"));
        assert!(matches!(&loaded.failures[1], ToolError::Factory { .. }));
    }

    #[test]
    fn knowledge_base_needs_retriever() {
        let loaded =
            ToolFactories::builtin().load(&[ToolConfig::new("knowledge_base")], &ToolDeps::default());
        assert!(loaded.registry.is_empty());
        assert_eq!(loaded.failures.len(), 1);
    }

    #[test]
    fn disabled_tools_are_skipped_silently() {
        let mut config = ToolConfig::new("document_generator");
        config.enabled = false;
        let loaded = ToolFactories::builtin().load(&[config], &ToolDeps::default());
        assert!(loaded.registry.is_empty());
        assert!(loaded.failures.is_empty());
    }

    #[test]
    fn custom_factories_can_be_registered() {
        fn custom(config: &ToolConfig, _: &ToolDeps) -> Result<Box<dyn Tool>, ToolError> {
            Ok(Box::new(DocumentGeneratorTool::from_config(config)?))
        }
        let mut factories = ToolFactories::empty();
        factories.register("reports", custom);
        assert_eq!(factories.ids(), vec!["reports"]);
        let loaded = factories.load(&[ToolConfig::new("reports")], &ToolDeps::default());
        assert_eq!(loaded.registry.len(), 1);
    }
}
