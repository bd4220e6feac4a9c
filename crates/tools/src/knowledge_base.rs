//! Knowledge base tool: the Retriever exposed to the agent.
//!
//! Searches under the turn's visibility filter and returns the retrieved
//! nodes both as readable context and as citations.

use std::sync::Arc;

use async_trait::async_trait;
use docsage_core::error::ToolError;
use docsage_core::tool::{Tool, ToolContext, ToolResult};
use docsage_index::{Retriever, format_context};
use serde_json::Value;
use tracing::debug;

/// Upper bound on `top_k` a model may request.
const MAX_TOP_K: u64 = 20;

pub struct KnowledgeBaseTool {
    retriever: Arc<Retriever>,
}

impl KnowledgeBaseTool {
    pub const ID: &'static str = "knowledge_base";

    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Tool for KnowledgeBaseTool {
    fn name(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> &str {
        "Search the document knowledge base. Returns the most relevant passages \
         with their source documents. Use this before answering questions about the documents."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for in the knowledge base"
                },
                "top_k": {
                    "type": "integer",
                    "description": "Maximum number of passages to return"
                }
            },
            "required": ["query"]
        })
    }

    fn status_title(&self, arguments: &Value) -> String {
        let query = arguments["query"].as_str().unwrap_or_default();
        format!("Retrieving context for: {query}")
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let top_k = arguments["top_k"]
            .as_u64()
            .map(|k| k.min(MAX_TOP_K) as usize);

        let nodes = self
            .retriever
            .retrieve(query, &ctx.filter, top_k)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: Self::ID.into(),
                reason: e.to_string(),
            })?;

        debug!(query, nodes = nodes.len(), "Knowledge base searched");

        let output = format_context(&nodes);
        let data = serde_json::to_value(&nodes).unwrap_or(Value::Null);
        Ok(ToolResult::text(output).with_citations(nodes).with_data(data))
    }
}
