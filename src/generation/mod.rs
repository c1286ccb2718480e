//! Text-generation providers.
//!
//! The RAG layer builds prompts as a list of [`ChatMessage`]s and hands them to an
//! [`LlmClient`], either waiting for the whole answer or consuming a [`TokenStream`]. Gemini,
//! Groq (OpenAI-compatible chat completions) and Ollama are supported; the active one is
//! picked by `LLM_PROVIDER`.

mod framing;
mod gemini;
mod ollama;
mod openai;

pub use gemini::GeminiClient;
pub use ollama::OllamaChatClient;
pub use openai::OpenAiCompatibleClient;

use crate::config::{Config, LlmProvider};
use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai";

/// Errors surfaced by generation backends.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Provider could not be reached or refused the credential.
    #[error("LLM provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider answered with an error.
    #[error("Failed to generate text: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Incremental tokens produced by a streaming generation, in generation order.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions framing the conversation.
    System,
    /// End-user turn.
    User,
    /// Model turn.
    Assistant,
}

/// One turn of a conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who is speaking.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Build an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Interface implemented by text-generation backends.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a complete answer for the conversation.
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, GenerationError>;

    /// Start a streaming generation. Errors before the first token are returned directly;
    /// later failures arrive as stream items.
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TokenStream, GenerationError>;
}

/// Build the generation client selected by configuration.
pub fn build_llm_client(config: &Config) -> Box<dyn LlmClient> {
    let api_key = config.llm_api_key.clone().unwrap_or_default();
    tracing::info!(
        provider = ?config.llm_provider,
        model = %config.llm_model,
        "Initializing LLM client"
    );
    match config.llm_provider {
        LlmProvider::Gemini => Box::new(GeminiClient::new(
            config
                .llm_base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            config.llm_model.clone(),
            api_key,
        )),
        LlmProvider::Groq => Box::new(OpenAiCompatibleClient::new(
            config
                .llm_base_url
                .clone()
                .unwrap_or_else(|| GROQ_BASE_URL.to_string()),
            config.llm_model.clone(),
            Some(api_key).filter(|key| !key.is_empty()),
        )),
        LlmProvider::Ollama => Box::new(OllamaChatClient::new(
            config
                .llm_base_url
                .clone()
                .unwrap_or_else(|| config.ollama_url.clone()),
            config.llm_model.clone(),
        )),
    }
}

/// Shared reqwest client builder for generation backends.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("docsense/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("Failed to construct reqwest::Client for generation")
}

/// Map a non-success provider response into a [`GenerationError`].
pub(crate) async fn status_error(provider: &str, response: reqwest::Response) -> GenerationError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        GenerationError::ProviderUnavailable(format!("{provider} rejected the credential ({status})"))
    } else {
        GenerationError::GenerationFailed(format!("{provider} returned {status}: {body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_roles_serialize_lowercase() {
        let message = ChatMessage::assistant("hi");
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"], "hi");
    }
}
