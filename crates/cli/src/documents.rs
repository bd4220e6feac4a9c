//! Load documents from a `file` source.
//!
//! A source path may be a single file or a directory walked recursively.
//! The `doc_id` is the path relative to the source root, `/`-separated, so it
//! stays stable across machines.

use std::path::Path;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use docsage_config::SourceConfig;
use docsage_core::document::Document;
use tracing::{debug, warn};
use walkdir::WalkDir;

const DEFAULT_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "rst"];

pub fn load_source(source: &SourceConfig) -> anyhow::Result<Vec<Document>> {
    if source.kind != "file" {
        bail!(
            "Source '{}' has unsupported kind '{}' (only \"file\" is built in)",
            source.name,
            source.kind
        );
    }

    let extensions = extensions(source);
    let root = source.path.as_path();
    if !root.exists() {
        bail!("Source '{}': {} does not exist", source.name, root.display());
    }

    let mut documents = Vec::new();
    if root.is_file() {
        let doc_id = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("Source file has no name")?;
        if let Some(doc) = load_file(root, doc_id, source)? {
            documents.push(doc);
        }
        return Ok(documents);
    }

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(source = %source.name, error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)));
        if !matches {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        let doc_id = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if let Some(doc) = load_file(path, doc_id, source)? {
            documents.push(doc);
        }
    }

    debug!(source = %source.name, documents = documents.len(), "Loaded source");
    Ok(documents)
}

/// `settings.extensions` overrides the default extension list.
fn extensions(source: &SourceConfig) -> Vec<String> {
    source
        .settings
        .get("extensions")
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim_start_matches('.').to_string())
                .collect()
        })
        .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect())
}

fn load_file(path: &Path, doc_id: String, source: &SourceConfig) -> anyhow::Result<Option<Document>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            warn!(path = %path.display(), "Skipping non-UTF-8 file");
            return Ok(None);
        }
        Err(e) => return Err(e).with_context(|| format!("Cannot read {}", path.display())),
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| doc_id.clone());
    let mut doc = Document::new(doc_id, text)
        .private(source.private)
        .with_origin(source.name.clone())
        .with_file_name(file_name);

    if let Ok(absolute) = path.canonicalize() {
        doc = doc.with_url(format!("file://{}", absolute.display()));
    }
    if let Ok(modified) = path.metadata().and_then(|m| m.modified()) {
        doc.metadata.updated_at = Some(DateTime::<Utc>::from(modified));
    }
    Ok(Some(doc))
}
