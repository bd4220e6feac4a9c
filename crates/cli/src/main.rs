//! docsage CLI, the main entry point.
//!
//! Commands:
//! - `ingest`  Reconcile files into the index
//! - `remove`  Drop documents from the index
//! - `chat`    Run an agent turn (wire frames, JSON, or interactive)
//! - `query`   Retrieve and synthesize a single answer
//! - `config`  Show, validate, or initialize configuration
//!
//! Logs go to stderr; stdout carries only command output.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docsage_config::AppConfig;

mod commands;
mod documents;
mod runtime;

#[derive(Parser)]
#[command(
    name = "docsage",
    about = "docsage: retrieval-augmented chat over your documents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.docsage/config.toml)
    #[arg(short, long, global = true, env = "DOCSAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest files or the configured sources
    Ingest(commands::ingest::IngestArgs),

    /// Remove documents and all their chunks
    Remove {
        /// Document ids to remove
        #[arg(required = true)]
        doc_ids: Vec<String>,
    },

    /// Chat with the agent
    Chat(commands::chat::ChatArgs),

    /// Ask one question against the knowledge base
    Query(commands::query::QueryArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config_cmd::ConfigAction,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    if let Commands::Config { action } = cli.command {
        return commands::config_cmd::run(action, cli.config.as_deref()).await;
    }

    let config = AppConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let runtime = runtime::Runtime::open(config).await?;

    match cli.command {
        Commands::Ingest(args) => commands::ingest::run(&runtime, args).await,
        Commands::Remove { doc_ids } => commands::ingest::remove(&runtime, doc_ids).await,
        Commands::Chat(args) => commands::chat::run(&runtime, args).await,
        Commands::Query(args) => commands::query::run(&runtime, args).await,
        Commands::Config { .. } => Ok(()),
    }
}
