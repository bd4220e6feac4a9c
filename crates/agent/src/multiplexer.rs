//! Stream multiplexer.
//!
//! Serializes the orchestrator's event sequence into wire frames, in
//! emission order. Tokens are written as they arrive. An error frame is
//! always the last frame: the multiplexer stops reading once it has written
//! one. Dropping the output side drops the event receiver, which cancels the
//! turn at its next send.

use docsage_core::document::SourceNode;
use docsage_core::message::Role;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::frame::Frame;
use crate::stream_event::AgentEvent;

/// Counts from a multiplexed stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultiplexSummary {
    pub frames: usize,
    pub tokens: usize,
    pub errored: bool,
}

/// Non-streaming reply: `{result: {role, content}, nodes}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub result: ResultMessage,
    pub nodes: Vec<SourceNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMessage {
    pub role: Role,
    pub content: String,
}

/// Encode events into frame lines on a spawned task.
pub fn multiplex(mut events: mpsc::Receiver<AgentEvent>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(128);
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(frame) = Frame::from_event(event) else {
                break;
            };
            let terminal = frame.is_error();
            if tx.send(frame.encode()).await.is_err() {
                debug!("Frame consumer dropped");
                break;
            }
            if terminal {
                break;
            }
        }
    });
    rx
}

/// Write frames to `writer` until the turn ends, flushing after every frame.
pub async fn write_frames<W>(
    mut events: mpsc::Receiver<AgentEvent>,
    writer: &mut W,
) -> std::io::Result<MultiplexSummary>
where
    W: AsyncWrite + Unpin,
{
    let mut summary = MultiplexSummary::default();
    while let Some(event) = events.recv().await {
        let Some(frame) = Frame::from_event(event) else {
            break;
        };
        if matches!(frame, Frame::Text(_)) {
            summary.tokens += 1;
        }
        writer.write_all(frame.encode().as_bytes()).await?;
        writer.flush().await?;
        summary.frames += 1;
        if frame.is_error() {
            summary.errored = true;
            break;
        }
    }
    Ok(summary)
}

/// Drain a turn into a single response. A failed turn yields its error message.
pub async fn collect_response(
    mut events: mpsc::Receiver<AgentEvent>,
) -> docsage_core::Result<ChatResponse> {
    let mut content = String::new();
    let mut nodes = Vec::new();

    while let Some(event) = events.recv().await {
        match event {
            AgentEvent::Token { content: token } => content.push_str(&token),
            AgentEvent::Sources { nodes: batch } => nodes.extend(batch),
            AgentEvent::Status { .. } | AgentEvent::Suggestions { .. } => {}
            AgentEvent::Error { message } => return Err(docsage_core::Error::Internal(message)),
            AgentEvent::Done { .. } => {
                return Ok(ChatResponse {
                    result: ResultMessage {
                        role: Role::Assistant,
                        content,
                    },
                    nodes,
                });
            }
        }
    }
    Err(docsage_core::Error::Internal(
        "turn ended before completing".into(),
    ))
}
