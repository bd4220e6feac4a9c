//! Web search tool backed by an HTTP JSON search endpoint.
//!
//! Settings:
//! - `endpoint` (required): search URL, queried as `GET {endpoint}?q=...&count=...`
//! - `api_key` (optional): sent as a bearer token
//! - `timeout_secs` (optional, default 15)
//!
//! The endpoint may answer with a bare array of results or an object holding
//! one under `results`, `items`, or `web.results`. Each result needs a `title`
//! and `url`; `snippet`, `description`, or `content` fill the snippet.

use std::time::Duration;

use async_trait::async_trait;
use docsage_config::ToolConfig;
use docsage_core::error::ToolError;
use docsage_core::tool::{Tool, ToolContext, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

const DEFAULT_RESULTS: u64 = 3;
const MAX_RESULTS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl WebSearchTool {
    pub const ID: &'static str = "web_search";

    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        }
    }

    pub fn from_config(config: &ToolConfig) -> Result<Self, ToolError> {
        let endpoint = config
            .settings
            .get("endpoint")
            .and_then(Value::as_str)
            .filter(|s| s.starts_with("http://") || s.starts_with("https://"))
            .ok_or_else(|| ToolError::Factory {
                tool_id: config.id.clone(),
                reason: "setting 'endpoint' must be an http(s) URL".into(),
            })?;
        let api_key = config
            .settings
            .get("api_key")
            .and_then(Value::as_str)
            .map(String::from);
        let timeout = config
            .settings
            .get("timeout_secs")
            .and_then(Value::as_u64)
            .unwrap_or(15);

        Ok(Self::new(endpoint, api_key, Duration::from_secs(timeout)))
    }

    fn failed(reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: Self::ID.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> &str {
        "Search the web for information not in the knowledge base. \
         Returns relevant results with titles, URLs, and snippets."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return (default 3)"
                }
            },
            "required": ["query"]
        })
    }

    fn status_title(&self, arguments: &Value) -> String {
        format!(
            "Searching the web for: {}",
            arguments["query"].as_str().unwrap_or_default()
        )
    }

    async fn execute(&self, arguments: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let count = arguments["num_results"]
            .as_u64()
            .unwrap_or(DEFAULT_RESULTS)
            .clamp(1, MAX_RESULTS);

        let mut request = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query.to_string()), ("count", count.to_string())]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::failed(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Self::failed(format!("search endpoint returned {status}")));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| Self::failed(format!("invalid JSON response: {e}")))?;

        let mut results = parse_results(&body);
        results.truncate(count as usize);
        debug!(query, results = results.len(), "Web search complete");

        if results.is_empty() {
            return Ok(ToolResult::text(format!("No web results for '{query}'.")));
        }

        let output = results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("[{}] {}\n{}\n{}", i + 1, r.title, r.url, r.snippet))
            .collect::<Vec<_>>()
            .join("\n\n");
        let data = serde_json::to_value(&results).unwrap_or(Value::Null);
        Ok(ToolResult::text(output).with_data(data))
    }
}

/// Extract results from the common response shapes.
pub fn parse_results(body: &Value) -> Vec<SearchResult> {
    let items = body
        .as_array()
        .or_else(|| body["results"].as_array())
        .or_else(|| body["items"].as_array())
        .or_else(|| body["web"]["results"].as_array());

    let Some(items) = items else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let title = item["title"].as_str()?;
            let url = item["url"].as_str().or_else(|| item["link"].as_str())?;
            let snippet = ["snippet", "description", "content"]
                .iter()
                .find_map(|k| item[*k].as_str())
                .unwrap_or_default();
            Some(SearchResult {
                title: title.to_string(),
                url: url.to_string(),
                snippet: snippet.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_shapes() {
        let bare = serde_json::json!([{"title": "A", "url": "https://a", "snippet": "sa"}]);
        assert_eq!(parse_results(&bare).len(), 1);

        let wrapped = serde_json::json!({"results": [
            {"title": "A", "url": "https://a", "content": "body"},
            {"title": "missing url"}
        ]});
        let results = parse_results(&wrapped);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippet, "body");

        let brave = serde_json::json!({"web": {"results": [
            {"title": "B", "url": "https://b", "description": "desc"}
        ]}});
        assert_eq!(parse_results(&brave)[0].snippet, "desc");

        let google = serde_json::json!({"items": [{"title": "G", "link": "https://g"}]});
        assert_eq!(parse_results(&google)[0].url, "https://g");

        assert!(parse_results(&serde_json::json!({"unexpected": true})).is_empty());
    }

    #[test]
    fn factory_requires_endpoint() {
        let err = WebSearchTool::from_config(&ToolConfig::new("web_search"))
            .err()
            .unwrap();
        assert!(matches!(err, ToolError::Factory { .. }));

        let mut config = ToolConfig::new("web_search");
        config
            .settings
            .insert("endpoint".into(), serde_json::json!("https://search.example.com/api"));
        assert!(WebSearchTool::from_config(&config).is_ok());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_execution_failure() {
        let tool = WebSearchTool::new("http://127.0.0.1:9/search", None, Duration::from_secs(2));
        let err = tool
            .execute(serde_json::json!({"query": "rust"}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[test]
    fn tool_definition() {
        let tool = WebSearchTool::new("https://x", None, Duration::from_secs(1));
        let def = tool.to_definition();
        assert_eq!(def.name, "web_search");
        assert!(!def.description.is_empty());
    }
}
