//! Google Gemini client (`generateContent` / `streamGenerateContent`).

use super::framing::{lines, sse_data};
use super::{
    ChatMessage, ChatRole, GenerationError, LlmClient, TokenStream, http_client, status_error,
};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

const PROVIDER: &str = "Gemini";

/// Client for the Gemini REST API.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        let parts = candidate.content?.parts;
        let text: String = parts.into_iter().filter_map(|part| part.text).collect();
        Some(text)
    }
}

impl GeminiClient {
    /// Create a client for `base_url` (e.g. `https://generativelanguage.googleapis.com/v1beta`).
    pub fn new(base_url: String, model: String, api_key: String) -> Self {
        Self {
            http: http_client(),
            base_url,
            model,
            api_key,
        }
    }

    fn endpoint(&self, method: &str) -> String {
        let model = self.model.trim_start_matches("models/");
        format!(
            "{}/models/{model}:{method}",
            self.base_url.trim_end_matches('/')
        )
    }

    async fn send(
        &self,
        method: &str,
        messages: &[ChatMessage],
    ) -> Result<reqwest::Response, GenerationError> {
        let mut request = self
            .http
            .post(self.endpoint(method))
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(messages));
        if method == "streamGenerateContent" {
            request = request.query(&[("alt", "sse")]);
        }

        let response = request.send().await.map_err(|error| {
            GenerationError::ProviderUnavailable(format!("failed to reach Gemini: {error}"))
        })?;
        if !response.status().is_success() {
            return Err(status_error(PROVIDER, response).await);
        }
        Ok(response)
    }
}

/// Gemini keeps system instructions apart from the turn list and calls the model `model`.
fn request_body(messages: &[ChatMessage]) -> Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|message| message.role == ChatRole::System)
        .map(|message| message.content.as_str())
        .collect();
    let contents: Vec<Value> = messages
        .iter()
        .filter(|message| message.role != ChatRole::System)
        .map(|message| {
            let role = match message.role {
                ChatRole::Assistant => "model",
                _ => "user",
            };
            json!({ "role": role, "parts": [{ "text": message.content }] })
        })
        .collect();

    let mut body = json!({ "contents": contents });
    if !system.is_empty() {
        body["systemInstruction"] = json!({ "parts": [{ "text": system.join("\n\n") }] });
    }
    body
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, GenerationError> {
        tracing::debug!(model = %self.model, turns = messages.len(), "Requesting Gemini completion");
        let response = self.send("generateContent", &messages).await?;
        let body: GenerateResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode Gemini response: {error}"))
        })?;
        body.text()
            .ok_or_else(|| GenerationError::InvalidResponse("Gemini returned no candidates".into()))
    }

    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TokenStream, GenerationError> {
        tracing::debug!(model = %self.model, turns = messages.len(), "Streaming Gemini completion");
        let response = self.send("streamGenerateContent", &messages).await?;
        Ok(Box::pin(candidate_tokens(response)))
    }
}

fn candidate_tokens(
    response: reqwest::Response,
) -> impl Stream<Item = Result<String, GenerationError>> + Send {
    try_stream! {
        let mut lines = Box::pin(lines(response.bytes_stream()));
        while let Some(line) = lines.next().await {
            let line = line?;
            let Some(data) = sse_data(&line) else {
                continue;
            };
            let chunk: GenerateResponse = serde_json::from_str(data).map_err(|error| {
                GenerationError::InvalidResponse(format!("bad Gemini stream chunk: {error}"))
            })?;
            if let Some(token) = chunk.text().filter(|token| !token.is_empty()) {
                yield token;
            }
        }
    }
}
