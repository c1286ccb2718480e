//! HTTP-backed embedding clients.

use super::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

fn http_client() -> Client {
    Client::builder()
        .user_agent(concat!("docsense/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("Failed to construct reqwest::Client for embeddings")
}

/// Embedding client backed by a local Ollama runtime (`/api/embeddings`).
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbeddingClient {
    /// Create a client targeting `base_url` with the given embedding model.
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            http: http_client(),
            base_url,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embeddings", self.base_url.trim_end_matches('/'))
    }

    async fn embed_one(&self, text: String) -> Result<Vec<f32>, EmbeddingClientError> {
        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "prompt": text }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaEmbeddingResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode Ollama embedding: {error}"
            ))
        })?;

        if body.embedding.is_empty() {
            return Err(EmbeddingClientError::InvalidResponse(
                "Ollama returned an empty embedding".into(),
            ));
        }
        Ok(body.embedding)
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        tracing::debug!(model = %self.model, count = texts.len(), "Requesting Ollama embeddings");
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_one(text).await?);
        }
        Ok(vectors)
    }
}

/// Embedding client for the OpenAI `/v1/embeddings` API (and compatible servers).
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingClient {
    /// Create a client targeting `base_url` with the given model and optional bearer token.
    pub fn new(base_url: String, model: String, api_key: Option<String>) -> Self {
        Self {
            http: http_client(),
            base_url,
            model,
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        tracing::debug!(model = %self.model, count = expected, "Requesting OpenAI embeddings");

        let mut request = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "input": texts }));
        if let Some(api_key) = self.api_key.as_deref() {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|error| {
            EmbeddingClientError::ProviderUnavailable(format!(
                "failed to reach {}: {error}",
                self.base_url
            ))
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(EmbeddingClientError::ProviderUnavailable(
                "embedding API rejected the credential".into(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "embedding API returned {status}: {body}"
            )));
        }

        let mut body: OpenAiEmbeddingResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode embedding response: {error}"
            ))
        })?;

        if body.data.len() != expected {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {expected} embeddings, got {}",
                body.data.len()
            )));
        }
        body.data.sort_by_key(|item| item.index);
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }
}
