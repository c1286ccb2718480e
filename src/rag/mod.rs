//! Retrieval-augmented generation over indexed documents.
//!
//! Ingestion chunks cleaned text, embeds every chunk and appends the resulting nodes to an
//! in-memory [`VectorIndex`]. Questions are embedded the same way, the closest passages are
//! handed to the language model as context, and answers are returned together with the
//! passages they were grounded on. [`RagService`] owns the index and all session state.

mod backends;
mod chat;
pub mod chunking;
pub mod index;
pub mod prompt;
mod service;
mod types;

pub use backends::Backends;
pub use chat::ChatEngine;
pub use chunking::{ChunkingError, Splitter};
pub use index::{IndexError, RetrievedPassage, VectorIndex};
pub use service::{BackendFactory, RagService, RagSettings};
pub use types::{Document, EXCERPT_CHARS, FinalResponse, SourceInfo, UNKNOWN_SOURCE};

use crate::embedding::EmbeddingClientError;
use crate::generation::GenerationError;
use futures_core::Stream;
use std::pin::Pin;
use thiserror::Error;

/// Message returned whenever an operation needs an index that does not exist yet.
pub const NO_DOCUMENTS_MESSAGE: &str = "No documents indexed. Please upload a document first.";

/// Incremental answer tokens produced by [`RagService::stream_query`].
pub type RagTokenStream = Pin<Box<dyn Stream<Item = Result<String, RagError>> + Send>>;

/// Errors surfaced by the RAG service.
#[derive(Debug, Error)]
pub enum RagError {
    /// Query, stream or summary requested before anything was indexed.
    #[error("{}", NO_DOCUMENTS_MESSAGE)]
    NoDocuments,
    /// Backend clients could not be initialized.
    #[error("Failed to initialize RAG backends: {0}")]
    Initialization(String),
    /// Splitter configuration was rejected.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// Chunking worker stopped before producing a result.
    #[error("Chunking task failed: {0}")]
    Task(String),
    /// Embedding provider failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Provider returned no vector for a query.
    #[error("Embedding provider returned no vector for the query")]
    EmptyEmbedding,
    /// Provider returned a different number of vectors than texts submitted.
    #[error("Embedding provider returned {actual} vectors for {expected} chunks")]
    EmbeddingCountMismatch {
        /// Number of chunks submitted.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
    /// New vectors do not fit the existing index.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Language model failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}
