//! `docsage ingest` and `docsage remove`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::bail;
use clap::Args;
use docsage_config::SourceConfig;
use docsage_ingest::{Chunker, IngestReport};
use tracing::info;

use crate::documents;
use crate::runtime::Runtime;

#[derive(Args)]
pub struct IngestArgs {
    /// Files or directories to ingest; defaults to the configured sources
    pub paths: Vec<PathBuf>,

    /// Mark the ingested documents private
    #[arg(long)]
    pub private: bool,

    /// Also remove indexed documents missing from this run
    #[arg(long)]
    pub sync: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(runtime: &Runtime, args: IngestArgs) -> anyhow::Result<()> {
    let sources: Vec<SourceConfig> = if args.paths.is_empty() {
        runtime.config.sources.clone()
    } else {
        args.paths
            .iter()
            .map(|path| SourceConfig {
                name: path.display().to_string(),
                kind: "file".into(),
                path: path.clone(),
                private: args.private,
                chunk_size: None,
                chunk_overlap: None,
                settings: HashMap::new(),
            })
            .collect()
    };
    if sources.is_empty() {
        bail!("Nothing to ingest: pass paths or declare [[sources]] in the config");
    }

    let report = ingest_sources(runtime, &sources, args.sync).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
        for failure in &report.failures {
            eprintln!("  failed: {}: {}", failure.doc_id, failure.reason);
        }
    }

    if !report.is_success() {
        bail!("{} document(s) failed to ingest", report.failures.len());
    }
    Ok(())
}

/// Reconcile each source with its own chunking settings. With `sync`, ledger
/// documents that no source produced are removed afterwards.
pub async fn ingest_sources(
    runtime: &Runtime,
    sources: &[SourceConfig],
    sync: bool,
) -> anyhow::Result<IngestReport> {
    let base = runtime.pipeline();
    let mut report = IngestReport::default();
    let mut seen = HashSet::new();

    for source in sources {
        let docs = documents::load_source(source)?;
        info!(source = %source.name, documents = docs.len(), "Ingesting source");
        seen.extend(docs.iter().map(|d| d.doc_id.clone()));

        let settings = source.effective_ingestion(&runtime.config.ingestion);
        let pipeline = base.clone().with_chunker(Chunker::from_config(&settings));
        report.merge(pipeline.ingest(docs).await);
    }

    if sync {
        report.merge(base.prune(&seen).await);
    }
    Ok(report)
}

pub async fn remove(runtime: &Runtime, doc_ids: Vec<String>) -> anyhow::Result<()> {
    let pipeline = runtime.pipeline();
    let known: HashSet<String> = runtime.store().doc_ids().await?.into_iter().collect();

    for doc_id in doc_ids {
        if !known.contains(&doc_id) {
            eprintln!("  not indexed: {doc_id}");
            continue;
        }
        let outcome = pipeline.remove(&doc_id).await?;
        println!("removed {} ({} chunks)", outcome.doc_id, outcome.removed);
    }
    Ok(())
}
