use super::chunking::Splitter;
use super::index::{Node, RetrievedPassage, VectorIndex, compute_chunk_hash};
use super::types::Document;
use super::RagError;
use crate::config::Config;
use crate::embedding::{EmbeddingClient, build_embedding_client};
use crate::generation::{LlmClient, build_llm_client};
use std::collections::HashSet;
use std::sync::Arc;

/// Model clients and splitter shared by every RAG operation.
///
/// Built once, on first use, by the service's backend factory.
pub struct Backends {
    embedder: Arc<dyn EmbeddingClient>,
    llm: Arc<dyn LlmClient>,
    splitter: Splitter,
}

impl Backends {
    /// Bundle already constructed clients.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LlmClient>,
        splitter: Splitter,
    ) -> Self {
        Self {
            embedder,
            llm,
            splitter,
        }
    }

    /// Build the clients selected by configuration.
    pub fn from_config(config: &Config) -> Result<Self, RagError> {
        let splitter = Splitter::new(config.chunk_size, config.chunk_overlap)?;
        Ok(Self::new(
            Arc::from(build_embedding_client(config)),
            Arc::from(build_llm_client(config)),
            splitter,
        ))
    }

    pub(crate) fn llm(&self) -> &dyn LlmClient {
        self.llm.as_ref()
    }

    /// Chunk and embed documents. Duplicate chunks within one document are embedded once.
    ///
    /// Tokenizing is CPU-bound, so chunking runs on the blocking pool.
    pub(crate) async fn build_nodes(&self, documents: &[Document]) -> Result<Vec<Node>, RagError> {
        let splitter = self.splitter.clone();
        let inputs: Vec<(Option<String>, String)> = documents
            .iter()
            .map(|document| (document.source.clone(), document.text.clone()))
            .collect();
        let pending = tokio::task::spawn_blocking(move || unique_chunks(&splitter, inputs))
            .await
            .map_err(|error| RagError::Task(error.to_string()))?;

        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = pending.iter().map(|(_, text)| text.clone()).collect();
        let vectors = self.embedder.generate_embeddings(texts).await?;
        if vectors.len() != pending.len() {
            return Err(RagError::EmbeddingCountMismatch {
                expected: pending.len(),
                actual: vectors.len(),
            });
        }

        tracing::debug!(
            documents = documents.len(),
            chunks = pending.len(),
            chunk_size = self.splitter.chunk_size(),
            "Embedded document chunks"
        );

        Ok(pending
            .into_iter()
            .zip(vectors)
            .map(|((source, text), vector)| Node {
                source,
                text,
                vector,
            })
            .collect())
    }

    /// Embed `query` and return the `top_k` closest passages.
    pub(crate) async fn retrieve(
        &self,
        index: &VectorIndex,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>, RagError> {
        let mut vectors = self
            .embedder
            .generate_embeddings(vec![query.to_string()])
            .await?;
        let vector = vectors.pop().ok_or(RagError::EmptyEmbedding)?;
        let passages = index.search(&vector, top_k);
        tracing::debug!(hits = passages.len(), top_k, "Retrieved passages");
        Ok(passages)
    }
}

fn unique_chunks(
    splitter: &Splitter,
    documents: Vec<(Option<String>, String)>,
) -> Vec<(Option<String>, String)> {
    let mut pending = Vec::new();
    for (source, text) in documents {
        let mut seen = HashSet::new();
        for chunk in splitter.split(&text) {
            if seen.insert(compute_chunk_hash(&chunk)) {
                pending.push((source.clone(), chunk));
            }
        }
    }
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingClient;
    use crate::generation::{ChatMessage, GenerationError, TokenStream};
    use async_trait::async_trait;

    struct SilentLlm;

    #[async_trait]
    impl LlmClient for SilentLlm {
        async fn complete(&self, _messages: Vec<ChatMessage>) -> Result<String, GenerationError> {
            Ok(String::new())
        }

        async fn stream(&self, _messages: Vec<ChatMessage>) -> Result<TokenStream, GenerationError> {
            Ok(Box::pin(futures_util::stream::empty()))
        }
    }

    fn backends(chunk_size: usize) -> Backends {
        Backends::new(
            Arc::new(HashEmbeddingClient::new(16)),
            Arc::new(SilentLlm),
            Splitter::whitespace(chunk_size, 0).expect("splitter"),
        )
    }

    #[tokio::test]
    async fn repeated_chunks_are_embedded_once_per_document() {
        let documents = vec![
            Document::new("alpha beta alpha beta gamma", "a.pdf"),
            Document::new("alpha beta", "b.pdf"),
        ];
        let nodes = backends(2).build_nodes(&documents).await.expect("nodes");

        let summary: Vec<(Option<&str>, &str)> = nodes
            .iter()
            .map(|node| (node.source.as_deref(), node.text.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Some("a.pdf"), "alpha beta"),
                (Some("a.pdf"), "gamma"),
                (Some("b.pdf"), "alpha beta"),
            ]
        );
        assert!(nodes.iter().all(|node| node.vector.len() == 16));
    }

    #[tokio::test]
    async fn blank_documents_produce_no_nodes() {
        let nodes = backends(4)
            .build_nodes(&[Document::new("   ", "empty.pdf")])
            .await
            .expect("nodes");
        assert!(nodes.is_empty());
    }
}
