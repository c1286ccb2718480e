//! OpenAI-compatible chat completions client (Groq by default).

use super::framing::{lines, sse_data};
use super::{ChatMessage, GenerationError, LlmClient, TokenStream, http_client, status_error};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const PROVIDER: &str = "chat completions API";

/// Client for `/v1/chat/completions` endpoints.
pub struct OpenAiCompatibleClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleClient {
    /// Create a client for `base_url` (without the `/v1` suffix).
    pub fn new(base_url: String, model: String, api_key: Option<String>) -> Self {
        Self {
            http: http_client(),
            base_url,
            model,
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        let mut request = self.http.post(self.endpoint()).json(&json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        }));
        if let Some(api_key) = self.api_key.as_deref() {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|error| {
            GenerationError::ProviderUnavailable(format!(
                "failed to reach {}: {error}",
                self.base_url
            ))
        })?;

        if !response.status().is_success() {
            return Err(status_error(PROVIDER, response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, GenerationError> {
        tracing::debug!(model = %self.model, turns = messages.len(), "Requesting chat completion");
        let response = self.send(&messages, false).await?;
        let body: CompletionResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode completion: {error}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::InvalidResponse("completion had no choices".into()))
    }

    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TokenStream, GenerationError> {
        tracing::debug!(model = %self.model, turns = messages.len(), "Streaming chat completion");
        let response = self.send(&messages, true).await?;
        Ok(Box::pin(delta_tokens(response)))
    }
}

fn delta_tokens(
    response: reqwest::Response,
) -> impl Stream<Item = Result<String, GenerationError>> + Send {
    try_stream! {
        let mut lines = Box::pin(lines(response.bytes_stream()));
        while let Some(line) = lines.next().await {
            let line = line?;
            let Some(data) = sse_data(&line) else {
                continue;
            };
            if data == "[DONE]" {
                break;
            }
            let chunk: StreamChunk = serde_json::from_str(data).map_err(|error| {
                GenerationError::InvalidResponse(format!("bad stream chunk: {error}"))
            })?;
            for choice in chunk.choices {
                if let Some(token) = choice.delta.content.filter(|token| !token.is_empty()) {
                    yield token;
                }
            }
        }
    }
}
