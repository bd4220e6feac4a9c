//! Document generator tool: writes model-authored content to a markdown or
//! HTML file and returns where it can be fetched.
//!
//! Settings:
//! - `output_dir` (default `output/tools`)
//! - `base_url` (optional): public prefix for generated files; without it the
//!   tool returns a `file://` URL

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use docsage_config::ToolConfig;
use docsage_core::error::ToolError;
use docsage_core::tool::{Tool, ToolContext, ToolResult};
use serde_json::Value;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Markdown,
    Html,
}

impl DocumentFormat {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Some(Self::Markdown),
            "html" => Some(Self::Html),
            _ => None,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Html => "html",
        }
    }
}

pub struct DocumentGeneratorTool {
    output_dir: PathBuf,
    base_url: Option<String>,
}

impl DocumentGeneratorTool {
    pub const ID: &'static str = "document_generator";

    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn from_config(config: &ToolConfig) -> Result<Self, ToolError> {
        let output_dir = config
            .settings
            .get("output_dir")
            .map(|v| {
                v.as_str().ok_or_else(|| ToolError::Factory {
                    tool_id: config.id.clone(),
                    reason: "setting 'output_dir' must be a string".into(),
                })
            })
            .transpose()?
            .unwrap_or("output/tools");

        let mut tool = Self::new(output_dir);
        if let Some(base) = config.settings.get("base_url").and_then(Value::as_str) {
            tool = tool.with_base_url(base);
        }
        Ok(tool)
    }

    async fn url_for(&self, path: &Path, file_name: &str) -> String {
        match &self.base_url {
            Some(base) => format!("{base}/{file_name}"),
            None => {
                let absolute = tokio::fs::canonicalize(path)
                    .await
                    .unwrap_or_else(|_| path.to_path_buf());
                format!("file://{}", absolute.display())
            }
        }
    }

    fn failed(reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: Self::ID.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for DocumentGeneratorTool {
    fn name(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> &str {
        "Generate a document file from content you have written. \
         Returns a URL where the user can open the file."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The full document content (markdown)"
                },
                "file_name": {
                    "type": "string",
                    "description": "File name without extension"
                },
                "format": {
                    "type": "string",
                    "enum": ["markdown", "html"],
                    "description": "Output format (default markdown)"
                }
            },
            "required": ["content", "file_name"]
        })
    }

    fn status_title(&self, arguments: &Value) -> String {
        format!(
            "Generating document: {}",
            arguments["file_name"].as_str().unwrap_or_default()
        )
    }

    async fn execute(&self, arguments: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;
        let raw_name = arguments["file_name"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'file_name' argument".into()))?;
        let format = match arguments["format"].as_str() {
            None => DocumentFormat::Markdown,
            Some(f) => DocumentFormat::parse(f).ok_or_else(|| {
                ToolError::InvalidArguments(format!("Unsupported format '{f}'"))
            })?,
        };

        let stem = sanitize_file_name(raw_name);
        if stem.is_empty() {
            return Err(ToolError::InvalidArguments(format!(
                "File name '{raw_name}' has no usable characters"
            )));
        }
        let file_name = format!("{stem}.{}", format.extension());

        let body = match format {
            DocumentFormat::Markdown => content.to_string(),
            DocumentFormat::Html => render_html(&stem, content),
        };

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| Self::failed(format!("cannot create output directory: {e}")))?;
        let path = self.output_dir.join(&file_name);
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| Self::failed(format!("cannot write {}: {e}", path.display())))?;

        let url = self.url_for(&path, &file_name).await;
        info!(file = %path.display(), "Generated document");

        Ok(ToolResult::text(format!("Document generated: {url}"))
            .with_data(serde_json::json!({ "url": url, "file_name": file_name })))
    }
}

/// Keep ASCII letters, digits, `-` and `_`; map spaces to `_`.
fn sanitize_file_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => Some(c),
            ' ' => Some('_'),
            _ => None,
        })
        .collect()
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Minimal HTML rendering: `#` headings and blank-line separated paragraphs.
fn render_html(title: &str, content: &str) -> String {
    let mut body = String::new();
    for block in content.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
        let level = block.chars().take_while(|c| *c == '#').count();
        if (1..=6).contains(&level) && block[level..].starts_with(' ') {
            body.push_str(&format!(
                "<h{level}>{}</h{level}>\n",
                escape_html(block[level..].trim())
            ));
        } else {
            body.push_str(&format!("<p>{}</p>\n", escape_html(block).replace('\n', "<br>")));
        }
    }
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n{body}</body>\n</html>\n",
        escape_html(title)
    )
}
