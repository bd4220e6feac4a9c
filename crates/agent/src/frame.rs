//! Wire frames.
//!
//! Each frame is one line: a single-character tag, `:`, and a JSON payload.
//!
//! | Tag | Payload |
//! |-----|---------|
//! | `0` | JSON string, one answer token |
//! | `8` | JSON array holding one `{type, data}` object |
//! | `3` | JSON string, fatal error (terminal) |

use docsage_core::document::SourceNode;
use docsage_core::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::stream_event::AgentEvent;

pub const TEXT_TAG: char = '0';
pub const DATA_TAG: char = '8';
pub const ERROR_TAG: char = '3';

/// Typed payload of a `8:` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DataPart {
    Events { title: String },
    Sources { nodes: Vec<SourceNode> },
    SuggestedQuestions(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Data(DataPart),
    Error(String),
}

impl Frame {
    /// Frame for an orchestrator event. `Done` has no wire representation;
    /// the stream simply ends.
    pub fn from_event(event: AgentEvent) -> Option<Self> {
        match event {
            AgentEvent::Token { content } => Some(Self::Text(content)),
            AgentEvent::Status { title } => Some(Self::Data(DataPart::Events { title })),
            AgentEvent::Sources { nodes } => Some(Self::Data(DataPart::Sources { nodes })),
            AgentEvent::Suggestions { questions } => {
                Some(Self::Data(DataPart::SuggestedQuestions(questions)))
            }
            AgentEvent::Error { message } => Some(Self::Error(message)),
            AgentEvent::Done { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Encode as one newline-terminated line.
    pub fn encode(&self) -> String {
        let (tag, payload) = match self {
            Self::Text(token) => (TEXT_TAG, Value::String(token.clone())),
            Self::Data(part) => (DATA_TAG, json!([part])),
            Self::Error(message) => (ERROR_TAG, Value::String(message.clone())),
        };
        format!("{tag}:{payload}\n")
    }

    /// Parse one line produced by [`encode`](Self::encode).
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (tag, payload) = line
            .split_once(':')
            .ok_or_else(|| ProtocolError::MalformedFrame(line.to_string()))?;
        let malformed = |_| ProtocolError::MalformedFrame(line.to_string());

        match tag {
            "0" => serde_json::from_str(payload).map(Self::Text).map_err(malformed),
            "3" => serde_json::from_str(payload).map(Self::Error).map_err(malformed),
            "8" => {
                let mut parts: Vec<DataPart> =
                    serde_json::from_str(payload).map_err(malformed)?;
                if parts.len() != 1 {
                    return Err(ProtocolError::MalformedFrame(line.to_string()));
                }
                Ok(Self::Data(parts.remove(0)))
            }
            _ => Err(ProtocolError::MalformedFrame(line.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_frame_is_json_string() {
        let line = Frame::Text("He said \"hi\"\n".into()).encode();
        assert_eq!(line, "0:\"He said \\\"hi\\\"\\n\"\n");
        assert!(!line.trim_end().contains('\n'));
    }

    #[test]
    fn status_frame_shape() {
        let line = Frame::Data(DataPart::Events {
            title: "Retrieving context for: letters".into(),
        })
        .encode();
        let payload: Value = serde_json::from_str(line.strip_prefix("8:").unwrap()).unwrap();
        assert_eq!(payload[0]["type"], "events");
        assert_eq!(payload[0]["data"]["title"], "Retrieving context for: letters");
    }

    #[test]
    fn sources_frame_shape() {
        let node = SourceNode {
            id: "fp".into(),
            metadata: Default::default(),
            score: 0.5,
            text: "body".into(),
            url: None,
        };
        let line = Frame::Data(DataPart::Sources { nodes: vec![node] }).encode();
        let payload: Value = serde_json::from_str(line.strip_prefix("8:").unwrap()).unwrap();
        assert_eq!(payload[0]["type"], "sources");
        assert_eq!(payload[0]["data"]["nodes"][0]["id"], "fp");
    }

    #[test]
    fn suggestions_frame_shape() {
        let line = Frame::Data(DataPart::SuggestedQuestions(vec!["Why?".into()])).encode();
        assert_eq!(line, "8:[{\"type\":\"suggested_questions\",\"data\":[\"Why?\"]}]\n");
    }

    #[test]
    fn error_frame_tag() {
        assert_eq!(Frame::Error("boom".into()).encode(), "3:\"boom\"\n");
    }

    #[test]
    fn decode_inverts_encode() {
        let frames = [
            Frame::Text("tok".into()),
            Frame::Data(DataPart::Events { title: "t".into() }),
            Frame::Data(DataPart::SuggestedQuestions(vec!["q?".into()])),
            Frame::Error("e".into()),
        ];
        for frame in frames {
            assert_eq!(Frame::decode(&frame.encode()).unwrap(), frame);
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Frame::decode("no tag here").is_err());
        assert!(Frame::decode("9:\"x\"").is_err());
        assert!(Frame::decode("0:not json").is_err());
        assert!(Frame::decode("8:[]").is_err());
    }

    #[test]
    fn done_has_no_frame() {
        let done = AgentEvent::Done {
            conversation_id: "c".into(),
            iterations: 1,
        };
        assert!(Frame::from_event(done).is_none());
    }
}
