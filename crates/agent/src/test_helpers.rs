//! Shared test helpers for orchestrator tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use docsage_core::error::ProviderError;
use docsage_core::message::{ChatMessage, MessageToolCall};
use docsage_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage,
};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` or `stream` consumes the next entry. Panics when
/// the script runs out, unless [`repeat_last`](Self::repeat_last) is set.
/// Streaming splits text content into word tokens; tool calls arrive in one
/// final chunk.
pub struct SequentialMockProvider {
    responses: Vec<Result<ProviderResponse, ProviderError>>,
    call_count: Mutex<usize>,
    requests: Mutex<Vec<ProviderRequest>>,
    repeat_last: bool,
    delay: Option<Duration>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    pub fn scripted(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses,
            call_count: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
            repeat_last: false,
            delay: None,
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Create a provider that first returns tool calls, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(tool_calls, ""),
            make_text_response(answer),
        ])
    }

    /// Keep returning the last scripted entry once the script is exhausted.
    pub fn repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Sleep before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    async fn next(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.requests.lock().unwrap().push(request);

        let mut count = self.call_count.lock().unwrap();
        let index = if *count < self.responses.len() {
            *count
        } else if self.repeat_last && !self.responses.is_empty() {
            self.responses.len() - 1
        } else {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                *count,
                self.responses.len()
            );
        };
        *count += 1;
        self.responses[index].clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.next(request).await
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let response = self.next(request).await?;
        let message = response.message;

        // Text first, tool calls on the finish chunk, as OpenAI-style streams do
        let mut chunks: Vec<StreamChunk> = message
            .content
            .split_inclusive(' ')
            .map(|token| StreamChunk {
                content: Some(token.to_string()),
                tool_calls: Vec::new(),
                done: false,
                usage: None,
            })
            .collect();
        chunks.push(StreamChunk {
            content: None,
            tool_calls: message.tool_calls,
            done: true,
            usage: response.usage,
        });

        let (tx, rx) = tokio::sync::mpsc::channel(chunks.len());
        for chunk in chunks {
            let _ = tx.send(Ok(chunk)).await;
        }
        Ok(rx)
    }
}

fn mock_usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: ChatMessage::assistant(text),
        usage: mock_usage(),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    let mut message = ChatMessage::assistant(thought);
    message.tool_calls = tool_calls;
    ProviderResponse {
        message,
        usage: mock_usage(),
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}
