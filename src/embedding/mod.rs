//! Embedding client abstraction and adapters.
//!
//! Every backend turns a batch of texts into one vector per text, in input order. The
//! RAG service only ever talks to [`EmbeddingClient`]; concrete clients are chosen from
//! configuration by [`build_embedding_client`].

mod remote;

pub use remote::{OllamaEmbeddingClient, OpenAiEmbeddingClient};

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use thiserror::Error;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider response could not be decoded or had the wrong shape.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Deterministic embedding client that hashes normalized words into a fixed-size unit vector.
///
/// Useful offline and in tests; texts sharing words land close together.
pub struct HashEmbeddingClient {
    dimension: usize,
}

impl HashEmbeddingClient {
    /// Construct a hashing client producing vectors of `dimension` components.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for word in text.split_whitespace() {
            let normalized = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if normalized.is_empty() {
                continue;
            }
            let slot = fnv1a(normalized.as_bytes()) as usize % dimension;
            embedding[slot] += 1.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        tracing::trace!(count = texts.len(), dimension = self.dimension, "Hashing embeddings");
        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}

/// Build an embedding client suitable for the supplied configuration.
pub fn build_embedding_client(config: &Config) -> Box<dyn EmbeddingClient> {
    tracing::info!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        "Initializing embedding client"
    );
    match config.embedding_provider {
        EmbeddingProvider::Ollama => Box::new(OllamaEmbeddingClient::new(
            config
                .embedding_base_url
                .clone()
                .unwrap_or_else(|| config.ollama_url.clone()),
            config.embedding_model.clone(),
        )),
        EmbeddingProvider::OpenAI => Box::new(OpenAiEmbeddingClient::new(
            config
                .embedding_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            config.embedding_model.clone(),
            config.embedding_api_key.clone(),
        )),
        EmbeddingProvider::Hash => Box::new(HashEmbeddingClient::new(config.embedding_dimension)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn hash_client_returns_one_unit_vector_per_text() {
        let client = HashEmbeddingClient::new(64);
        let vectors = client
            .generate_embeddings(vec!["The sky is blue.".into(), "grass".into()])
            .await
            .expect("embeddings");

        assert_eq!(vectors.len(), 2);
        for vector in &vectors {
            assert_eq!(vector.len(), 64);
            assert!((dot(vector, vector) - 1.0).abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn hash_client_scores_shared_words_higher() {
        let client = HashEmbeddingClient::new(256);
        let vectors = client
            .generate_embeddings(vec![
                "What color is the sky?".into(),
                "The sky is blue.".into(),
                "Rust borrow checker lifetimes".into(),
            ])
            .await
            .expect("embeddings");

        assert!(dot(&vectors[0], &vectors[1]) > dot(&vectors[0], &vectors[2]));
    }

    #[tokio::test]
    async fn hash_client_rejects_zero_dimension() {
        let client = HashEmbeddingClient::new(0);
        let error = client
            .generate_embeddings(vec!["text".into()])
            .await
            .expect_err("zero dimension");
        assert!(matches!(error, EmbeddingClientError::GenerationFailed(_)));
    }

    #[tokio::test]
    async fn empty_text_maps_to_zero_vector() {
        let client = HashEmbeddingClient::new(8);
        let vectors = client
            .generate_embeddings(vec![String::new()])
            .await
            .expect("embeddings");
        assert!(vectors[0].iter().all(|value| *value == 0.0));
    }
}
