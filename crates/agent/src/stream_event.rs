//! Turn-level events.
//!
//! `AgentEvent` is what the orchestrator emits while a turn runs. The
//! multiplexer turns these into wire frames; the non-streaming path folds
//! them into a single response.

use docsage_core::document::SourceNode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Incremental answer token.
    Token { content: String },

    /// Human-readable progress notice, e.g. "Retrieving context for: ...".
    Status { title: String },

    /// Deduplicated citation set for the answer.
    Sources { nodes: Vec<SourceNode> },

    /// Follow-up questions the user might ask next.
    Suggestions { questions: Vec<String> },

    /// The turn reached `Done`.
    Done {
        conversation_id: String,
        iterations: usize,
    },

    /// Unrecoverable failure; nothing follows.
    Error { message: String },
}

impl AgentEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::Status { .. } => "status",
            Self::Sources { .. } => "sources",
            Self::Suggestions { .. } => "suggestions",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Whether the turn emits nothing after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
