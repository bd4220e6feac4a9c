//! End-to-end tests for docsage.
//!
//! These exercise ingestion, filtered retrieval, the agent turn, and the wire
//! stream together, plus the `docsage` binary against an on-disk index.

use std::process::Command;
use std::sync::{Arc, Mutex};

use docsage_agent::{Frame, Orchestrator, collect_response, write_frames};
use docsage_agent::frame::DataPart;
use docsage_config::ToolConfig;
use docsage_core::document::Document;
use docsage_core::error::ProviderError;
use docsage_core::filter::{QueryFilter, QueryFilterBuilder};
use docsage_core::index::VectorIndex;
use docsage_core::message::{ChatMessage, MessageToolCall};
use docsage_core::provider::{Provider, ProviderRequest, ProviderResponse};
use docsage_index::{HashEmbedder, InMemoryDocumentStore, InMemoryVectorIndex, Retriever, SqliteIndex};
use docsage_ingest::IngestionPipeline;
use docsage_tools::{ToolDeps, ToolFactories};

const LETTER: &str = "Letters must include a date and signature.";
const QUESTION: &str = "What must a letter include?";

// ── Mock Provider ────────────────────────────────────────────────────────

/// Returns scripted responses in sequence. Streaming uses the trait default,
/// so each reply arrives as a single chunk.
struct ScriptedProvider {
    responses: Vec<Result<ProviderResponse, ProviderError>>,
    call_count: Mutex<usize>,
}

impl ScriptedProvider {
    fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses,
            call_count: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut count = self.call_count.lock().unwrap();
        let response = self
            .responses
            .get(*count)
            .cloned()
            .unwrap_or_else(|| panic!("ScriptedProvider exhausted at call #{}", *count));
        *count += 1;
        response
    }
}

fn text_response(text: &str) -> Result<ProviderResponse, ProviderError> {
    Ok(ProviderResponse {
        message: ChatMessage::assistant(text),
        usage: None,
        model: "mock".into(),
    })
}

fn tool_response(tool_calls: Vec<MessageToolCall>) -> Result<ProviderResponse, ProviderError> {
    let mut message = ChatMessage::assistant("");
    message.tool_calls = tool_calls;
    Ok(ProviderResponse {
        message,
        usage: None,
        model: "mock".into(),
    })
}

fn knowledge_base_call(query: &str) -> MessageToolCall {
    MessageToolCall {
        id: "call_kb".into(),
        name: "knowledge_base".into(),
        arguments: serde_json::json!({ "query": query }).to_string(),
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

struct Stack {
    pipeline: IngestionPipeline,
    retriever: Arc<Retriever>,
}

fn memory_stack() -> Stack {
    let index = Arc::new(InMemoryVectorIndex::new());
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(HashEmbedder::default());
    Stack {
        pipeline: IngestionPipeline::new(embedder.clone(), index.clone(), store),
        retriever: Arc::new(Retriever::new(index, embedder)),
    }
}

fn orchestrator(stack: &Stack, provider: Arc<ScriptedProvider>) -> Orchestrator {
    let loaded = ToolFactories::builtin().load(
        &[ToolConfig::new("knowledge_base")],
        &ToolDeps::with_retriever(stack.retriever.clone()),
    );
    assert!(loaded.failures.is_empty());
    Orchestrator::new(provider, Arc::new(loaded.registry), "mock")
}

fn decode_all(bytes: Vec<u8>) -> Vec<Frame> {
    String::from_utf8(bytes)
        .unwrap()
        .lines()
        .map(|line| Frame::decode(line).unwrap())
        .collect()
}

// ── E2E: Letters example ─────────────────────────────────────────────────

#[tokio::test]
async fn e2e_letters_example_streams_answer_with_citation() {
    let stack = memory_stack();
    let report = stack
        .pipeline
        .ingest(vec![Document::new("letters.md", LETTER)])
        .await;
    assert!(report.is_success());
    assert_eq!(report.created, 1);

    // Empty allow-list still sees public documents
    let filter = QueryFilterBuilder::default().build().unwrap();
    let nodes = stack.retriever.retrieve(QUESTION, &filter, None).await.unwrap();
    assert!(!nodes.is_empty());
    assert_eq!(nodes[0].doc_id(), Some("letters.md"));

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![knowledge_base_call(QUESTION)]),
        text_response("A letter must include a date and a signature."),
    ]));
    let orchestrator = orchestrator(&stack, provider.clone());
    let events = orchestrator
        .chat(vec![ChatMessage::user(QUESTION)], filter)
        .unwrap();

    let mut out = Vec::new();
    let summary = write_frames(events, &mut out).await.unwrap();
    assert!(!summary.errored);
    assert_eq!(provider.calls(), 2);

    let frames = decode_all(out);
    match &frames[0] {
        Frame::Data(DataPart::Events { title }) => {
            assert_eq!(title, &format!("Retrieving context for: {QUESTION}"));
        }
        other => panic!("expected a status frame first, got {other:?}"),
    }

    let answer: String = frames
        .iter()
        .filter_map(|f| match f {
            Frame::Text(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert!(!answer.is_empty());

    let cited = frames.iter().find_map(|f| match f {
        Frame::Data(DataPart::Sources { nodes }) => Some(nodes),
        _ => None,
    });
    let cited = cited.expect("sources frame");
    assert!(cited.iter().any(|n| n.doc_id() == Some("letters.md")));
    assert!(!frames.iter().any(Frame::is_error));
}

#[tokio::test]
async fn e2e_non_streaming_response_shape() {
    let stack = memory_stack();
    stack
        .pipeline
        .ingest(vec![Document::new("letters.md", LETTER)])
        .await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![knowledge_base_call("letter requirements")]),
        text_response("A date and a signature."),
    ]));
    let events = orchestrator(&stack, provider)
        .chat(vec![ChatMessage::user(QUESTION)], QueryFilter::public_only())
        .unwrap();

    let response = collect_response(events).await.unwrap();
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["result"]["role"], "assistant");
    assert_eq!(json["result"]["content"], "A date and a signature.");
    assert_eq!(json["nodes"][0]["metadata"]["doc_id"], "letters.md");
}

// ── E2E: Visibility ──────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_private_documents_need_allow_list() {
    let stack = memory_stack();
    stack
        .pipeline
        .ingest(vec![
            Document::new("letters.md", LETTER),
            Document::new("secret.md", "Secret letters include a wax seal.").private(true),
        ])
        .await;

    for query in ["wax seal", "secret letters", QUESTION] {
        let public = QueryFilterBuilder::default().allow(["other.md"]).build().unwrap();
        let nodes = stack.retriever.retrieve(query, &public, Some(10)).await.unwrap();
        assert!(nodes.iter().all(|n| n.doc_id() != Some("secret.md")));
    }

    let allowed = QueryFilterBuilder::default().allow(["secret.md"]).build().unwrap();
    let nodes = stack
        .retriever
        .retrieve("wax seal", &allowed, Some(10))
        .await
        .unwrap();
    assert!(nodes.iter().any(|n| n.doc_id() == Some("secret.md")));
}

// ── E2E: Failure paths ───────────────────────────────────────────────────

#[tokio::test]
async fn e2e_provider_failure_ends_stream_with_error_frame() {
    let stack = memory_stack();
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![knowledge_base_call("anything")]),
        Err(ProviderError::AuthenticationFailed("bad key".into())),
    ]));
    let events = orchestrator(&stack, provider)
        .chat(vec![ChatMessage::user("hi")], QueryFilter::public_only())
        .unwrap();

    let mut out = Vec::new();
    let summary = write_frames(events, &mut out).await.unwrap();
    assert!(summary.errored);

    let frames = decode_all(out);
    match frames.last() {
        Some(Frame::Error(message)) => assert!(message.contains("bad key")),
        other => panic!("expected error frame last, got {other:?}"),
    }
    assert_eq!(frames.iter().filter(|f| f.is_error()).count(), 1);
}

// ── E2E: Durable index ───────────────────────────────────────────────────

#[tokio::test]
async fn e2e_sqlite_reingest_is_idempotent_and_replaces_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");
    let sqlite = Arc::new(SqliteIndex::open(path.to_str().unwrap()).await.unwrap());
    let embedder = Arc::new(HashEmbedder::default());
    let pipeline = IngestionPipeline::new(embedder, sqlite.clone(), sqlite.clone());

    let first = pipeline.ingest(vec![Document::new("letters.md", LETTER)]).await;
    assert_eq!(first.chunks_inserted, 1);
    let before = sqlite.fingerprints_for("letters.md").await.unwrap();

    let again = pipeline.ingest(vec![Document::new("letters.md", LETTER)]).await;
    assert_eq!(again.unchanged, 1);
    assert_eq!(again.chunks_inserted, 0);
    assert_eq!(sqlite.count().await.unwrap(), 1);

    let changed = pipeline
        .ingest(vec![Document::new("letters.md", "Memos need a subject line.")])
        .await;
    assert_eq!(changed.updated, 1);
    let after = sqlite.fingerprints_for("letters.md").await.unwrap();
    assert!(before.is_disjoint(&after));
    assert_eq!(sqlite.count().await.unwrap(), 1);
}

// ── E2E: Binary ──────────────────────────────────────────────────────────

#[test]
fn e2e_cli_ingest_then_retrieve() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(docs.join("letters.md"), LETTER).unwrap();
    std::fs::write(docs.join("finance.txt"), "Quarterly revenue grew by ten percent.").unwrap();

    let config = dir.path().join("config.toml");
    let db = dir.path().join("index.db").display().to_string();
    std::fs::write(&config, format!("[index]\nbackend = \"sqlite\"\npath = {db:?}\n")).unwrap();

    let bin = env!("CARGO_BIN_EXE_docsage");
    let ingest = Command::new(bin)
        .arg("--config")
        .arg(&config)
        .arg("ingest")
        .arg(&docs)
        .output()
        .unwrap();
    assert!(
        ingest.status.success(),
        "ingest failed: {}",
        String::from_utf8_lossy(&ingest.stderr)
    );
    assert!(String::from_utf8_lossy(&ingest.stdout).contains("2 documents"));

    let query = Command::new(bin)
        .arg("--config")
        .arg(&config)
        .args(["query", QUESTION, "--retrieve-only"])
        .output()
        .unwrap();
    assert!(
        query.status.success(),
        "query failed: {}",
        String::from_utf8_lossy(&query.stderr)
    );
    let json: serde_json::Value = serde_json::from_slice(&query.stdout).unwrap();
    assert_eq!(json["nodes"][0]["metadata"]["doc_id"], "letters.md");
}
