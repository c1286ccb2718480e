//! Ollama chat client (`/api/chat`), streaming NDJSON when asked to.

use super::framing::lines;
use super::{ChatMessage, GenerationError, LlmClient, TokenStream, http_client, status_error};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

/// Client for a local Ollama runtime.
pub struct OllamaChatClient {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

impl OllamaChatClient {
    /// Create a client targeting `base_url` with the given chat model.
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            http: http_client(),
            base_url,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404 (is model '{}' pulled?)",
                self.endpoint(),
                self.model
            )));
        }
        if !response.status().is_success() {
            return Err(status_error("Ollama", response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for OllamaChatClient {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, GenerationError> {
        let response = self.send(&messages, false).await?;
        let body: ChatResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if let Some(error) = body.error {
            return Err(GenerationError::GenerationFailed(error));
        }
        if !body.done {
            return Err(GenerationError::InvalidResponse(
                "Ollama response incomplete".into(),
            ));
        }
        Ok(body.message.map(|message| message.content).unwrap_or_default())
    }

    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TokenStream, GenerationError> {
        let response = self.send(&messages, true).await?;
        Ok(Box::pin(ndjson_tokens(response)))
    }
}

fn ndjson_tokens(
    response: reqwest::Response,
) -> impl Stream<Item = Result<String, GenerationError>> + Send {
    try_stream! {
        let mut lines = Box::pin(lines(response.bytes_stream()));
        while let Some(line) = lines.next().await {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let chunk: ChatResponse = serde_json::from_str(&line).map_err(|error| {
                GenerationError::InvalidResponse(format!("bad Ollama stream line: {error}"))
            })?;
            if let Some(error) = chunk.error {
                Err::<(), _>(GenerationError::GenerationFailed(error))?;
            }
            if let Some(message) = chunk.message.filter(|message| !message.content.is_empty()) {
                yield message.content;
            }
            if chunk.done {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn complete_handles_successful_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/chat")
                    .json_body_partial(r#"{"model": "llama3.1", "stream": false}"#);
                then.status(200).json_body(json!({
                    "message": { "role": "assistant", "content": "Summary text" },
                    "done": true
                }));
            })
            .await;

        let client = OllamaChatClient::new(server.base_url(), "llama3.1".into());
        let answer = client
            .complete(vec![ChatMessage::user("Summarize")])
            .await
            .expect("answer");

        mock.assert();
        assert_eq!(answer, "Summary text");
    }

    #[tokio::test]
    async fn stream_reads_ndjson_until_done() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).body(concat!(
                    "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
                    "{\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
                    "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
                ));
            })
            .await;

        let client = OllamaChatClient::new(server.base_url(), "llama3.1".into());
        let tokens: Vec<String> = client
            .stream(vec![ChatMessage::user("greet")])
            .await
            .expect("stream")
            .map(|token| token.expect("token"))
            .collect()
            .await;

        assert_eq!(tokens, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn stream_surfaces_inline_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).body("{\"error\":\"model crashed\"}\n");
            })
            .await;

        let client = OllamaChatClient::new(server.base_url(), "llama3.1".into());
        let mut stream = client
            .stream(vec![ChatMessage::user("greet")])
            .await
            .expect("stream");
        let first = stream.next().await.expect("one item");
        assert!(matches!(first, Err(GenerationError::GenerationFailed(ref message)) if message == "model crashed"));
    }

    #[tokio::test]
    async fn missing_model_maps_to_provider_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(404).body("model not found");
            })
            .await;

        let client = OllamaChatClient::new(server.base_url(), "absent".into());
        let error = client
            .complete(vec![ChatMessage::user("hi")])
            .await
            .expect_err("404");
        assert!(matches!(error, GenerationError::ProviderUnavailable(_)));
    }
}
