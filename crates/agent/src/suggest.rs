//! Follow-up question suggestions.
//!
//! One provider call after the answer is complete. Output is parsed
//! leniently: code fences, bullets and numbering are stripped, and at most
//! [`MAX_SUGGESTIONS`] non-empty lines are kept.

use std::sync::Arc;

use docsage_core::error::ProviderError;
use docsage_core::message::{ChatMessage, Role};
use docsage_core::provider::{Provider, ProviderRequest};
use tracing::debug;

pub const MAX_SUGGESTIONS: usize = 3;

const SUGGESTION_PROMPT: &str = "You suggest the next questions a user might ask. \
Given the conversation below, reply with exactly three short follow-up questions, \
one per line, with no numbering and no other text.";

#[derive(Clone)]
pub struct Suggester {
    provider: Arc<dyn Provider>,
    model: String,
}

impl Suggester {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub async fn suggest(
        &self,
        history: &[ChatMessage],
        answer: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let mut transcript = String::new();
        for message in history {
            let speaker = match message.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                _ => continue,
            };
            if message.content.trim().is_empty() {
                continue;
            }
            transcript.push_str(&format!("{speaker}: {}\n", message.content.trim()));
        }
        transcript.push_str(&format!("Assistant: {}\n", answer.trim()));

        let request = ProviderRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::system(SUGGESTION_PROMPT),
                ChatMessage::user(transcript),
            ],
        );
        let response = self.provider.complete(request).await?;
        let questions = parse_suggestions(&response.message.content);
        debug!(count = questions.len(), "Suggested follow-up questions");
        Ok(questions)
    }
}

/// Extract up to [`MAX_SUGGESTIONS`] questions from free-form model output.
pub fn parse_suggestions(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("```"))
        .map(|line| {
            line.trim_start_matches(|c: char| {
                c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*' | '•')
            })
            .trim()
        })
        .filter(|line| !line.is_empty())
        .take(MAX_SUGGESTIONS)
        .map(str::to_string)
        .collect()
}
