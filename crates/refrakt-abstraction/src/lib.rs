//! Text-generation abstraction for Refrakt.
//!
//! The job engine only ever needs one thing from a language model: turn a
//! prompt into text. This crate defines that seam so the engine can be driven
//! by a hosted model, a local one, or a scripted stand-in during tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents an error that can occur when asking a model for text.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// The request never produced a response (network failure, bad URL).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The provider answered with an error status or an unusable body.
    #[error("Model Response Error: {0}")]
    ModelResponseError(String),

    /// The response could not be decoded.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// The provider is not configured (e.g. missing API key).
    #[error("Unsupported Model Provider: {0}")]
    UnsupportedModelProvider(String),

    /// Provider quota exceeded or rate limit hit.
    #[error("Provider '{provider}' quota exceeded{}", message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
    QuotaExceeded {
        /// The provider name (e.g. "gemini").
        provider: String,
        /// Optional error message from the provider.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// Parameters for controlling generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Nucleus sampling mass.
    pub top_p: Option<f32>,
    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self { temperature: Some(0.2), top_p: None, max_tokens: None }
    }
}

/// The text returned by a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated content.
    pub content: String,

    /// Optional: the ID of the model that produced the response.
    pub model_id: Option<String>,

    /// Optional: usage statistics for the request.
    pub usage: Option<ModelUsage>,
}

/// Usage statistics for a model request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Number of tokens in the prompt.
    pub prompt_tokens: u32,

    /// Number of tokens in the completion.
    pub completion_tokens: u32,

    /// Total number of tokens used.
    pub total_tokens: u32,
}

/// A model that can complete a prompt.
///
/// Implementations must be `Send + Sync` so a single instance can serve
/// every job accepted by the engine.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Generates a completion for `prompt`.
    ///
    /// # Errors
    /// Returns a `ModelError` if generation fails.
    async fn generate_text(
        &self,
        prompt: &str,
        parameters: Option<GenerationParameters>,
    ) -> Result<ModelResponse, ModelError>;

    /// Returns the ID of the model.
    fn model_id(&self) -> &str;
}
