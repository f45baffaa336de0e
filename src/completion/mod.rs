//! Language-model completion clients used for grounded answers and field extraction.
//!
//! Both backends issue a single non-streaming request per call. Callers decide how to degrade
//! when a request fails; clients only report what went wrong.

use crate::config::{Config, LlmProvider};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

mod gemini;
mod ollama;

pub use gemini::GeminiCompletionClient;
pub use ollama::OllamaCompletionClient;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum CompletionClientError {
    /// Provider was not configured or could not be reached.
    #[error("Completion provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// A single prompt sent to the language model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Fully rendered prompt text.
    pub prompt: String,
    /// Sampling temperature; the pipeline always uses `0.0`.
    pub temperature: f32,
}

impl CompletionRequest {
    /// Build a request with deterministic sampling.
    pub fn deterministic(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 0.0,
        }
    }
}

/// Interface implemented by language-model providers.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Return the model's raw text reply for the request.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionClientError>;
}

/// Build a completion client for the configured provider.
///
/// A Gemini client without an API key is still constructed; each call then fails with
/// [`CompletionClientError::ProviderUnavailable`] so the answer path can degrade.
pub fn build_completion_client(
    config: &Config,
) -> Result<Arc<dyn CompletionClient>, CompletionClientError> {
    tracing::info!(
        provider = ?config.llm_provider,
        model = %config.llm_model,
        "Initializing completion client"
    );
    let client: Arc<dyn CompletionClient> = match config.llm_provider {
        LlmProvider::Gemini => {
            if config.gemini_api_key.is_none() {
                tracing::warn!("GEMINI_API_KEY is not set; answers will report provider errors");
            }
            Arc::new(GeminiCompletionClient::new(
                config
                    .gemini_base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string()),
                config.llm_model.clone(),
                config.gemini_api_key.clone(),
            )?)
        }
        LlmProvider::Ollama => Arc::new(OllamaCompletionClient::new(
            config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            config.llm_model.clone(),
        )?),
    };
    Ok(client)
}
