//! `docsage query`: retrieve, then synthesize one answer. Prints JSON.

use clap::Args;
use serde_json::json;

use crate::commands::ingest::ingest_sources;
use crate::runtime::Runtime;

#[derive(Args)]
pub struct QueryArgs {
    /// The question to ask
    pub question: String,

    /// Private documents this request may read (repeatable)
    #[arg(long = "allow", value_name = "DOC_ID")]
    pub allow: Vec<String>,

    /// Narrow retrieval to these documents (repeatable)
    #[arg(long = "only", value_name = "DOC_ID")]
    pub only: Vec<String>,

    /// Nodes to retrieve (defaults to retrieval.top_k)
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Skip synthesis and print only the retrieved nodes
    #[arg(long)]
    pub retrieve_only: bool,
}

pub async fn run(runtime: &Runtime, args: QueryArgs) -> anyhow::Result<()> {
    if runtime.config.index.backend == docsage_config::IndexBackend::Memory {
        ingest_sources(runtime, &runtime.config.sources, false).await?;
    }

    let filter = runtime.filter(&args.allow, &args.only)?;

    let output = if args.retrieve_only {
        let nodes = runtime
            .retriever()
            .retrieve(&args.question, &filter, args.top_k)
            .await?;
        json!({ "nodes": nodes })
    } else {
        let retriever = runtime
            .retriever()
            .with_synthesizer(runtime.chat_provider()?, runtime.config.default_model.clone());
        let response = retriever.query(&args.question, &filter, args.top_k).await?;
        serde_json::to_value(response)?
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
