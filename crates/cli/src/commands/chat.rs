//! `docsage chat`: one turn on stdout, or an interactive session.
//!
//! With a message, stdout carries the wire stream (`0:` / `8:` / `3:` lines),
//! or one JSON object with `--no-stream`. Without a message, an interactive
//! session renders answers for a human and keeps the conversation history.

use std::io::Write;

use anyhow::bail;
use clap::Args;
use docsage_agent::{AgentEvent, Orchestrator, collect_response, write_frames};
use docsage_core::filter::QueryFilter;
use docsage_core::message::ChatMessage;
use tokio::io::AsyncBufReadExt;

use crate::commands::ingest::ingest_sources;
use crate::runtime::Runtime;

#[derive(Args)]
pub struct ChatArgs {
    /// Send a single message instead of entering interactive mode
    #[arg(short, long)]
    pub message: Option<String>,

    /// Private documents this request may read (repeatable)
    #[arg(long = "allow", value_name = "DOC_ID")]
    pub allow: Vec<String>,

    /// Narrow retrieval to these documents (repeatable)
    #[arg(long = "only", value_name = "DOC_ID")]
    pub only: Vec<String>,

    /// Print one JSON response instead of streaming frames
    #[arg(long)]
    pub no_stream: bool,
}

pub async fn run(runtime: &Runtime, args: ChatArgs) -> anyhow::Result<()> {
    if runtime.config.index.backend == docsage_config::IndexBackend::Memory {
        ingest_sources(runtime, &runtime.config.sources, false).await?;
    }

    let orchestrator = runtime.orchestrator()?;
    let filter = runtime.filter(&args.allow, &args.only)?;

    match args.message {
        Some(message) => single_turn(&orchestrator, filter, message, args.no_stream).await,
        None => interactive(&orchestrator, filter).await,
    }
}

async fn single_turn(
    orchestrator: &Orchestrator,
    filter: QueryFilter,
    message: String,
    no_stream: bool,
) -> anyhow::Result<()> {
    let events = orchestrator.chat(vec![ChatMessage::user(message)], filter)?;

    if no_stream {
        let response = collect_response(events).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let mut stdout = tokio::io::stdout();
    let summary = write_frames(events, &mut stdout).await?;
    if summary.errored {
        bail!("Turn failed; see the error frame");
    }
    Ok(())
}

async fn interactive(orchestrator: &Orchestrator, filter: QueryFilter) -> anyhow::Result<()> {
    println!();
    println!("  docsage chat");
    println!("  Tools: {}", orchestrator.tools().names().join(", "));
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut history: Vec<ChatMessage> = Vec::new();
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        history.push(ChatMessage::user(line));
        let events = orchestrator.chat(history.clone(), filter.clone())?;
        match render(events).await? {
            Some(answer) => history.push(ChatMessage::assistant(answer)),
            // Keep history ending on an answered turn
            None => {
                history.pop();
            }
        }
    }
    Ok(())
}

/// Print a turn for a human. Returns the answer when the turn completed.
async fn render(
    mut events: tokio::sync::mpsc::Receiver<AgentEvent>,
) -> anyhow::Result<Option<String>> {
    let mut stdout = std::io::stdout();
    let mut answer = String::new();
    let mut started = false;

    while let Some(event) = events.recv().await {
        match event {
            AgentEvent::Token { content } => {
                if !started {
                    write!(stdout, "\n  Assistant > ")?;
                    started = true;
                }
                write!(stdout, "{content}")?;
                stdout.flush()?;
                answer.push_str(&content);
            }
            AgentEvent::Status { title } => eprintln!("  [{title}]"),
            AgentEvent::Sources { nodes } => {
                writeln!(stdout, "\n\n  Sources:")?;
                for (i, node) in nodes.iter().enumerate() {
                    let name = node
                        .metadata
                        .get("file_name")
                        .and_then(|v| v.as_str())
                        .unwrap_or(&node.id);
                    writeln!(stdout, "    [{}] {} (score {:.2})", i + 1, name, node.score)?;
                }
            }
            AgentEvent::Suggestions { questions } => {
                writeln!(stdout, "\n  You might also ask:")?;
                for question in questions {
                    writeln!(stdout, "    - {question}")?;
                }
            }
            AgentEvent::Done { .. } => {
                writeln!(stdout, "\n")?;
                return Ok(Some(answer));
            }
            AgentEvent::Error { message } => {
                eprintln!("\n  [Error] {message}\n");
                return Ok(None);
            }
        }
    }
    Ok(None)
}
