//! In-memory vector index with cosine-similarity search.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised when inserting into the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A vector's length differs from the vectors already stored.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension fixed by the first inserted vector.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
}

/// A chunk of a document together with its embedding.
#[derive(Debug, Clone)]
pub struct Node {
    /// Name of the document the chunk came from, if known.
    pub source: Option<String>,
    /// Chunk text.
    pub text: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
}

/// A node returned by a search, with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    /// Name of the document the passage came from, if known.
    pub source: Option<String>,
    /// Passage text.
    pub text: String,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Nodes searched exhaustively, stored as one shared segment per insert.
///
/// Cloning copies segment handles only, so a new snapshot of a large index is cheap to build.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    segments: Vec<Arc<[Node]>>,
    len: usize,
    dimension: Option<usize>,
}

impl VectorIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no node has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append nodes. Either all nodes are inserted or none is.
    pub fn insert(&mut self, nodes: Vec<Node>) -> Result<usize, IndexError> {
        let mut expected = self.dimension;
        for node in &nodes {
            let actual = node.vector.len();
            match expected {
                Some(expected) if expected != actual => {
                    return Err(IndexError::DimensionMismatch { expected, actual });
                }
                _ => expected = Some(actual),
            }
        }

        let inserted = nodes.len();
        self.dimension = expected;
        if inserted > 0 {
            self.segments.push(Arc::from(nodes));
            self.len += inserted;
        }
        Ok(inserted)
    }

    /// Return up to `top_k` nodes ordered by decreasing similarity; ties keep insertion order.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<RetrievedPassage> {
        if top_k == 0 || self.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(f32, &Node)> = self
            .segments
            .iter()
            .flat_map(|segment| segment.iter())
            .map(|node| (cosine_similarity(query, &node.vector), node))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(score, node)| RetrievedPassage {
                source: node.source.clone(),
                text: node.text.clone(),
                score,
            })
            .collect()
    }
}

/// Cosine similarity of two vectors; zero when either has no magnitude or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let (dot, norm_a, norm_b) = a.iter().zip(b).fold(
        (0.0_f32, 0.0_f32, 0.0_f32),
        |(dot, norm_a, norm_b), (x, y)| (dot + x * y, norm_a + x * x, norm_b + y * y),
    );
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Stable digest of a chunk, used to skip duplicates within one ingestion.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(source: &str, text: &str, vector: Vec<f32>) -> Node {
        Node {
            source: Some(source.to_string()),
            text: text.to_string(),
            vector,
        }
    }

    #[test]
    fn search_orders_by_similarity_and_truncates() {
        let mut index = VectorIndex::new();
        index
            .insert(vec![
                node("a.pdf", "east", vec![1.0, 0.0]),
                node("b.pdf", "north", vec![0.0, 1.0]),
                node("c.pdf", "north-east", vec![0.7, 0.7]),
            ])
            .expect("insert");

        let hits = index.search(&[0.0, 1.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "north");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].text, "north-east");
    }

    #[test]
    fn insert_rejects_mismatched_dimensions_atomically() {
        let mut index = VectorIndex::new();
        index.insert(vec![node("a", "x", vec![1.0, 0.0])]).expect("insert");

        let error = index
            .insert(vec![node("b", "y", vec![1.0, 0.0]), node("c", "z", vec![1.0])])
            .expect_err("mismatch");
        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn empty_index_and_zero_top_k_return_nothing() {
        let mut index = VectorIndex::new();
        assert!(index.search(&[1.0], 3).is_empty());
        index.insert(vec![node("a", "x", vec![1.0])]).expect("insert");
        assert!(index.search(&[1.0], 0).is_empty());
    }

    #[test]
    fn snapshots_share_nodes_and_stay_independent() {
        let mut index = VectorIndex::new();
        index.insert(vec![node("a", "east", vec![1.0, 0.0])]).expect("insert");

        let mut next = index.clone();
        assert!(Arc::ptr_eq(&index.segments[0], &next.segments[0]));
        next.insert(vec![node("b", "north", vec![0.0, 1.0])]).expect("insert");

        assert_eq!(index.len(), 1);
        assert_eq!(next.len(), 2);
        assert_eq!(next.search(&[0.0, 1.0], 1)[0].text, "north");
        assert_eq!(index.search(&[0.0, 1.0], 1)[0].text, "east");
    }

    #[test]
    fn cosine_similarity_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn chunk_hash_is_hex_sha256() {
        let hash = compute_chunk_hash("hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, compute_chunk_hash("hello"));
        assert_ne!(hash, compute_chunk_hash("hello "));
    }
}
