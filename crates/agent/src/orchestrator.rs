//! The agent orchestrator.
//!
//! A chat turn is an explicit state machine:
//!
//! ```text
//! AwaitingInput → Reasoning → {ToolDispatch → Reasoning}* → Synthesizing → Done
//!                      └──────────── any provider error ───────────→ Failed
//! ```
//!
//! Reasoning streams the model's reply with the tool definitions attached,
//! forwarding text tokens as they arrive. A reply that requests tools, even
//! after some text, moves to ToolDispatch; a reply that ends without tool
//! calls is the answer and moves to Synthesizing. Once `max_iterations`
//! reasoning rounds have run, a final reply is requested without tools.
//!
//! Tool failures and tool timeouts become failed tool results the model can
//! read. Provider failures and provider timeouts end the turn with an
//! `Error` event. The turn stops at the next send once the receiver is
//! dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use docsage_config::AppConfig;
use docsage_core::document::SourceNode;
use docsage_core::error::{ProtocolError, ProviderError};
use docsage_core::event::{DomainEvent, EventBus};
use docsage_core::filter::QueryFilter;
use docsage_core::message::{ChatMessage, Conversation, MessageToolCall, Role};
use docsage_core::provider::{Provider, ProviderRequest};
use docsage_core::tool::{ToolCall, ToolContext, ToolRegistry, ToolResult};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::citations::CitationSet;
use crate::stream_event::AgentEvent;
use crate::suggest::Suggester;

/// Capacity of the per-turn event channel.
const EVENT_BUFFER: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    AwaitingInput,
    Reasoning,
    ToolDispatch,
    Synthesizing,
    Done,
    Failed,
}

/// What a finished turn looked like. Returned by [`Orchestrator::run_turn`].
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub conversation_id: String,
    /// Every state entered, in order
    pub states: Vec<TurnState>,
    /// Reasoning rounds run
    pub iterations: usize,
    pub answer: String,
    pub citations: Vec<SourceNode>,
    pub suggestions: Vec<String>,
    pub error: Option<String>,
    /// The receiver went away before the turn finished
    pub cancelled: bool,
}

impl TurnOutcome {
    pub fn final_state(&self) -> Option<TurnState> {
        self.states.last().copied()
    }
}

enum TurnError {
    Provider(ProviderError),
    Cancelled,
}

impl From<ProviderError> for TurnError {
    fn from(e: ProviderError) -> Self {
        Self::Provider(e)
    }
}

enum Reply {
    Answer(String),
    ToolCalls {
        thought: String,
        calls: Vec<MessageToolCall>,
    },
}

/// Mutable state owned by a single turn.
struct Turn {
    conversation_id: String,
    messages: Vec<ChatMessage>,
    ctx: ToolContext,
    tx: mpsc::Sender<AgentEvent>,
    states: Vec<TurnState>,
    iterations: usize,
    citations: CitationSet,
    answer: String,
    nodes: Vec<SourceNode>,
    suggestions: Vec<String>,
}

impl Turn {
    fn transition(&mut self, state: TurnState) {
        debug!(conversation_id = %self.conversation_id, state = ?state, "Turn state");
        self.states.push(state);
    }

    async fn emit(&self, event: AgentEvent) -> Result<(), TurnError> {
        self.tx.send(event).await.map_err(|_| TurnError::Cancelled)
    }
}

/// Runs chat turns against a provider and a fixed tool registry.
///
/// Cheap to clone; every turn runs on its own task with its own state.
#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_iterations: usize,
    provider_timeout: Duration,
    tool_timeout: Duration,
    system_prompt: String,
    suggester: Option<Suggester>,
    events: Option<Arc<EventBus>>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, model: impl Into<String>) -> Self {
        let defaults = docsage_config::AgentConfig::default();
        Self {
            provider,
            tools,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_iterations: defaults.max_iterations,
            provider_timeout: Duration::from_secs(defaults.provider_timeout_secs),
            tool_timeout: Duration::from_secs(defaults.tool_timeout_secs),
            system_prompt: defaults.system_prompt,
            suggester: None,
            events: None,
        }
    }

    /// Build from the application config. Suggestions reuse the chat provider.
    pub fn from_config(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, config: &AppConfig) -> Self {
        let agent = &config.agent;
        let mut orchestrator = Self::new(provider.clone(), tools, config.default_model.clone())
            .with_temperature(config.default_temperature)
            .with_max_tokens(Some(config.default_max_tokens))
            .with_max_iterations(agent.max_iterations)
            .with_provider_timeout(Duration::from_secs(agent.provider_timeout_secs))
            .with_tool_timeout(Duration::from_secs(agent.tool_timeout_secs))
            .with_system_prompt(agent.system_prompt.clone());
        if agent.suggest_questions {
            orchestrator =
                orchestrator.with_suggester(Suggester::new(provider, config.default_model.clone()));
        }
        orchestrator
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Reasoning rounds allowed before a tool-free reply is forced.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_provider_timeout(mut self, limit: Duration) -> Self {
        self.provider_timeout = limit;
        self
    }

    pub fn with_tool_timeout(mut self, limit: Duration) -> Self {
        self.tool_timeout = limit;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_suggester(mut self, suggester: Suggester) -> Self {
        self.suggester = Some(suggester);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Validate caller messages and start a turn scoped by `filter`.
    pub fn chat(
        &self,
        messages: Vec<ChatMessage>,
        filter: QueryFilter,
    ) -> Result<mpsc::Receiver<AgentEvent>, ProtocolError> {
        let conversation = Conversation::from_request(messages)?;
        let ctx = ToolContext {
            filter,
            conversation_id: conversation.id.clone(),
        };
        Ok(self.stream(conversation, ctx))
    }

    /// Run a turn on a spawned task, returning its event stream.
    pub fn stream(&self, conversation: Conversation, ctx: ToolContext) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let this = self.clone();
        tokio::spawn(async move {
            this.run_turn(conversation, ctx, tx).await;
        });
        rx
    }

    /// Run one turn to completion on the current task.
    pub async fn run_turn(
        &self,
        conversation: Conversation,
        ctx: ToolContext,
        tx: mpsc::Sender<AgentEvent>,
    ) -> TurnOutcome {
        let conversation_id = conversation.id.to_string();
        let mut messages = Vec::with_capacity(conversation.messages.len() + 1);
        if conversation.messages.first().map(|m| m.role) != Some(Role::System) {
            messages.push(ChatMessage::system(self.system_prompt.clone()));
        }
        messages.extend(conversation.messages);

        let mut turn = Turn {
            conversation_id: conversation_id.clone(),
            messages,
            ctx,
            tx,
            states: vec![TurnState::AwaitingInput],
            iterations: 0,
            citations: CitationSet::new(),
            answer: String::new(),
            nodes: Vec::new(),
            suggestions: Vec::new(),
        };

        info!(
            conversation_id = %conversation_id,
            provider = self.provider.name(),
            tools = self.tools.len(),
            filter = %turn.ctx.filter,
            "Turn started"
        );

        let (error, cancelled) = match self.drive(&mut turn).await {
            Ok(()) => {
                info!(
                    conversation_id = %conversation_id,
                    iterations = turn.iterations,
                    citations = turn.nodes.len(),
                    "Turn completed"
                );
                self.publish(DomainEvent::TurnCompleted {
                    conversation_id: conversation_id.clone(),
                    iterations: turn.iterations,
                    citations: turn.nodes.len(),
                    timestamp: Utc::now(),
                });
                (None, false)
            }
            Err(TurnError::Cancelled) => {
                info!(conversation_id = %conversation_id, "Receiver dropped; turn cancelled");
                (None, true)
            }
            Err(TurnError::Provider(e)) => {
                let message = e.to_string();
                warn!(conversation_id = %conversation_id, error = %message, "Turn failed");
                turn.transition(TurnState::Failed);
                let cancelled = turn
                    .emit(AgentEvent::Error {
                        message: message.clone(),
                    })
                    .await
                    .is_err();
                self.publish(DomainEvent::TurnFailed {
                    conversation_id: conversation_id.clone(),
                    error_message: message.clone(),
                    timestamp: Utc::now(),
                });
                (Some(message), cancelled)
            }
        };

        TurnOutcome {
            conversation_id,
            states: turn.states,
            iterations: turn.iterations,
            answer: turn.answer,
            citations: turn.nodes,
            suggestions: turn.suggestions,
            error,
            cancelled,
        }
    }

    async fn drive(&self, turn: &mut Turn) -> Result<(), TurnError> {
        let answer = loop {
            if turn.iterations >= self.max_iterations {
                warn!(
                    conversation_id = %turn.conversation_id,
                    max_iterations = self.max_iterations,
                    "Iteration bound reached; forcing synthesis"
                );
                turn.transition(TurnState::Synthesizing);
                match self.stream_reply(turn, false).await? {
                    Reply::Answer(text) => break text,
                    Reply::ToolCalls { thought, .. } => break thought,
                }
            }

            turn.iterations += 1;
            turn.transition(TurnState::Reasoning);
            match self.stream_reply(turn, true).await? {
                Reply::Answer(text) => break text,
                Reply::ToolCalls { thought, calls } => {
                    turn.transition(TurnState::ToolDispatch);
                    self.dispatch(turn, thought, calls).await?;
                }
            }
        };
        turn.answer = answer;

        let nodes = std::mem::take(&mut turn.citations).into_sorted();
        if !nodes.is_empty() {
            turn.emit(AgentEvent::Sources {
                nodes: nodes.clone(),
            })
            .await?;
        }
        turn.nodes = nodes;

        self.suggest(turn).await?;

        turn.transition(TurnState::Done);
        turn.emit(AgentEvent::Done {
            conversation_id: turn.conversation_id.clone(),
            iterations: turn.iterations,
        })
        .await
    }

    /// Stream one model reply, forwarding text tokens as they arrive.
    ///
    /// With `offer_tools` the reply may still turn into a tool round after
    /// some text (models often narrate before calling a tool); that text
    /// becomes the assistant's thought and stays streamed. Without tools the
    /// caller has already entered Synthesizing and any tool calls are dropped.
    async fn stream_reply(&self, turn: &mut Turn, offer_tools: bool) -> Result<Reply, TurnError> {
        let mut request = ProviderRequest::new(self.model.clone(), turn.messages.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        if offer_tools {
            request = request.with_tools(self.tools.definitions());
        }
        request.stream = true;

        let mut rx = timeout(self.provider_timeout, self.provider.stream(request))
            .await
            .map_err(|_| self.provider_timed_out())??;

        let mut content = String::new();
        let mut calls: Vec<MessageToolCall> = Vec::new();

        loop {
            let next = timeout(self.provider_timeout, rx.recv())
                .await
                .map_err(|_| self.provider_timed_out())?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;

            if !chunk.tool_calls.is_empty() {
                if offer_tools {
                    merge_tool_calls(&mut calls, chunk.tool_calls);
                } else {
                    warn!(
                        ignored = chunk.tool_calls.len(),
                        "Tool calls requested during synthesis; ignoring"
                    );
                }
            }

            if let Some(token) = chunk.content.filter(|c| !c.is_empty()) {
                content.push_str(&token);
                turn.emit(AgentEvent::Token { content: token }).await?;
            }

            if chunk.done {
                break;
            }
        }

        if calls.is_empty() {
            if offer_tools {
                turn.transition(TurnState::Synthesizing);
            }
            return Ok(Reply::Answer(content));
        }
        debug!(
            conversation_id = %turn.conversation_id,
            iteration = turn.iterations,
            calls = calls.len(),
            streamed = content.len(),
            "Model requested tools"
        );
        Ok(Reply::ToolCalls {
            thought: content,
            calls,
        })
    }

    async fn dispatch(
        &self,
        turn: &mut Turn,
        thought: String,
        calls: Vec<MessageToolCall>,
    ) -> Result<(), TurnError> {
        let mut assistant = ChatMessage::assistant(thought);
        assistant.tool_calls = calls.clone();
        turn.messages.push(assistant);

        for call in calls {
            let result = self.invoke(turn, &call).await?;
            turn.citations.extend(result.citations);
            turn.messages
                .push(ChatMessage::tool_result(call.id.clone(), result.output));
        }
        Ok(())
    }

    async fn invoke(&self, turn: &Turn, call: &MessageToolCall) -> Result<ToolResult, TurnError> {
        let arguments: serde_json::Value = if call.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str(&call.arguments) {
                Ok(value) => value,
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool arguments are not valid JSON");
                    return Ok(ToolResult::failure(
                        call.id.clone(),
                        format!("arguments for '{}' are not valid JSON: {e}", call.name),
                    ));
                }
            }
        };

        let title = match self.tools.get(&call.name) {
            Some(tool) => tool.status_title(&arguments),
            None => format!("Calling tool: {}", call.name),
        };
        turn.emit(AgentEvent::Status { title }).await?;

        let tool_call = ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        };
        let started = Instant::now();
        let result = match timeout(self.tool_timeout, self.tools.execute(&tool_call, &turn.ctx)).await
        {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(tool = %call.name, error = %e, "Tool failed");
                ToolResult::failure(call.id.clone(), e.to_string())
            }
            Err(_) => {
                warn!(tool = %call.name, timeout_secs = self.tool_timeout.as_secs(), "Tool timed out");
                ToolResult::failure(
                    call.id.clone(),
                    format!(
                        "tool '{}' timed out after {}s",
                        call.name,
                        self.tool_timeout.as_secs()
                    ),
                )
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        debug!(
            tool = %call.name,
            success = result.success,
            citations = result.citations.len(),
            duration_ms,
            "Tool executed"
        );
        self.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success: result.success,
            duration_ms,
            timestamp: Utc::now(),
        });
        Ok(result)
    }

    async fn suggest(&self, turn: &mut Turn) -> Result<(), TurnError> {
        let Some(suggester) = &self.suggester else {
            return Ok(());
        };
        if turn.answer.trim().is_empty() {
            return Ok(());
        }

        match timeout(self.provider_timeout, suggester.suggest(&turn.messages, &turn.answer)).await {
            Ok(Ok(questions)) if !questions.is_empty() => {
                turn.emit(AgentEvent::Suggestions {
                    questions: questions.clone(),
                })
                .await?;
                turn.suggestions = questions;
            }
            Ok(Ok(_)) => debug!("No follow-up questions produced"),
            Ok(Err(e)) => warn!(error = %e, "Follow-up suggestions failed; skipping"),
            Err(_) => warn!("Follow-up suggestions timed out; skipping"),
        }
        Ok(())
    }

    fn provider_timed_out(&self) -> ProviderError {
        ProviderError::Timeout(format!(
            "{} did not respond within {}s",
            self.provider.name(),
            self.provider_timeout.as_secs()
        ))
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

/// Fold streamed tool-call deltas: a repeated id extends the arguments.
fn merge_tool_calls(calls: &mut Vec<MessageToolCall>, deltas: Vec<MessageToolCall>) {
    for delta in deltas {
        match calls
            .iter_mut()
            .find(|c| !delta.id.is_empty() && c.id == delta.id)
        {
            Some(existing) => {
                if existing.name.is_empty() {
                    existing.name = delta.name;
                }
                existing.arguments.push_str(&delta.arguments);
            }
            None => calls.push(delta),
        }
    }
}
