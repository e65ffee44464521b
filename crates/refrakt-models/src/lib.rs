//! Model implementations for Refrakt.
//!
//! This crate provides concrete implementations of the `TextModel` trait.
//!
//! # Supported Providers
//!
//! - **Scripted**: Testing and offline runs; replays queued responses
//! - **Gemini**: Google's Gemini models (API key required)

pub mod gemini;

use async_trait::async_trait;
use refrakt_abstraction::{GenerationParameters, ModelError, ModelResponse, ModelUsage, TextModel};
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::debug;

pub use gemini::GeminiModel;

/// A `TextModel` that replays pre-recorded answers in order.
///
/// Once the queue is drained every further call fails with
/// `ModelError::ModelResponseError`, which makes it handy for exercising the
/// generation-failure path as well.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    id: String,
    responses: Mutex<VecDeque<Result<String, ModelError>>>,
}

impl ScriptedModel {
    /// Creates a new `ScriptedModel` with the given ID and no responses.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), responses: Mutex::new(VecDeque::new()) }
    }

    /// Queues a successful response.
    #[must_use]
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.responses.get_mut().push_back(Ok(content.into()));
        self
    }

    /// Queues a failure.
    #[must_use]
    pub fn with_error(mut self, error: ModelError) -> Self {
        self.responses.get_mut().push_back(Err(error));
        self
    }

    /// Number of responses not yet consumed.
    pub async fn remaining(&self) -> usize {
        self.responses.lock().await.len()
    }
}

#[async_trait]
impl TextModel for ScriptedModel {
    async fn generate_text(
        &self,
        prompt: &str,
        parameters: Option<GenerationParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.id,
            prompt_len = prompt.len(),
            parameters = ?parameters,
            "ScriptedModel generating text"
        );

        let next = self.responses.lock().await.pop_front().ok_or_else(|| {
            ModelError::ModelResponseError(format!("scripted model '{}' has no responses left", self.id))
        })?;
        let content = next?;

        let prompt_tokens = count_tokens(prompt);
        let completion_tokens = count_tokens(&content);
        Ok(ModelResponse {
            content,
            model_id: Some(self.id.clone()),
            usage: Some(ModelUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
        })
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}

/// Count tokens in a string (simplified: word count).
#[allow(clippy::cast_possible_truncation)]
fn count_tokens(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_model_replays_in_order() {
        let model = ScriptedModel::new("scripted")
            .with_response("first")
            .with_error(ModelError::RequestError("offline".to_string()))
            .with_response("third");

        assert_eq!(model.remaining().await, 3);
        let first = model.generate_text("p", None).await.unwrap();
        assert_eq!(first.content, "first");
        assert_eq!(first.model_id.as_deref(), Some("scripted"));

        let second = model.generate_text("p", None).await;
        assert_eq!(second.unwrap_err(), ModelError::RequestError("offline".to_string()));

        let third = model.generate_text("two words", None).await.unwrap();
        assert_eq!(third.usage.unwrap().prompt_tokens, 2);
    }

    #[tokio::test]
    async fn test_scripted_model_fails_when_drained() {
        let model = ScriptedModel::new("empty");
        let result = model.generate_text("anything", None).await;
        assert!(matches!(result, Err(ModelError::ModelResponseError(_))));
    }
}
