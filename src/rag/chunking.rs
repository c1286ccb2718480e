//! Token-bounded chunking of document text.
//!
//! Chunks are produced by `semchunk-rs`, which prefers splitting at paragraph, sentence and
//! word boundaries, under a token budget counted with the `cl100k_base` encoding. When the
//! encoding cannot be loaded the splitter falls back to counting whitespace-separated words.
//! An optional overlap repeats the tail of each chunk at the start of the next one so that
//! passages spanning a boundary stay retrievable; chunks are cut `overlap` tokens short so
//! the repeated tail still fits the budget.

use semchunk_rs::Chunker;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::cl100k_base;

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Errors produced while configuring the splitter.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Splits text into chunks of at most `chunk_size` tokens.
#[derive(Clone)]
pub struct Splitter {
    chunk_size: usize,
    overlap: usize,
    token_counter: TokenCounter,
}

impl std::fmt::Debug for Splitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Splitter")
            .field("chunk_size", &self.chunk_size)
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}

impl Splitter {
    /// Build a splitter counting tokens with `cl100k_base`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        let token_counter = match cl100k_base() {
            Ok(encoding) => {
                let encoding = Arc::new(encoding);
                Arc::new(move |segment: &str| encoding.encode_ordinary(segment).len())
                    as TokenCounter
            }
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    "Tokenizer unavailable; falling back to whitespace counter"
                );
                whitespace_token_counter()
            }
        };
        Self::with_counter(chunk_size, overlap, token_counter)
    }

    /// Build a splitter that counts whitespace-separated words as tokens.
    pub fn whitespace(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        Self::with_counter(chunk_size, overlap, whitespace_token_counter())
    }

    fn with_counter(
        chunk_size: usize,
        overlap: usize,
        token_counter: TokenCounter,
    ) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        Ok(Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
            token_counter,
        })
    }

    /// Token budget per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `text` into chunks. Returns an empty vector for blank input.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let counter = self.token_counter.clone();
        let chunker = Chunker::new(
            self.chunk_size - self.overlap,
            Box::new(move |segment: &str| counter.as_ref()(segment)),
        );
        let chunks = chunker.chunk(text);
        self.apply_overlap(chunks)
    }

    fn count(&self, text: &str) -> usize {
        self.token_counter.as_ref()(text)
    }

    fn apply_overlap(&self, chunks: Vec<String>) -> Vec<String> {
        if self.overlap == 0 || chunks.len() < 2 {
            return chunks;
        }

        let mut overlapped = Vec::with_capacity(chunks.len());
        let mut previous: Option<String> = None;
        for current in chunks {
            let chunk = match previous.as_deref() {
                Some(prev) => {
                    let tail = self.tail_within(prev, self.overlap);
                    let mut combined = String::with_capacity(tail.len() + current.len() + 1);
                    combined.push_str(tail);
                    if !tail.is_empty()
                        && !tail.ends_with(char::is_whitespace)
                        && !current.starts_with(char::is_whitespace)
                    {
                        combined.push(' ');
                    }
                    combined.push_str(&current);
                    self.tail_within(&combined, self.chunk_size).to_string()
                }
                None => current.clone(),
            };
            overlapped.push(chunk);
            previous = Some(current);
        }
        overlapped
    }

    /// Longest suffix of `text` (trimmed at the start) that fits in `budget` tokens.
    ///
    /// Binary-searches the character boundaries, so a chunk costs a logarithmic number of
    /// token counts instead of one per character.
    fn tail_within<'a>(&self, text: &'a str, budget: usize) -> &'a str {
        let trimmed = text.trim_start();
        if self.count(trimmed) <= budget {
            return trimmed;
        }

        let boundaries: Vec<usize> = text.char_indices().map(|(offset, _)| offset).collect();
        let suffix = |index: usize| text[boundaries[index]..].trim_start();
        // `high` always points at a boundary whose suffix fits; `boundaries.len()` is the
        // empty suffix.
        let (mut low, mut high) = (1, boundaries.len());
        while low < high {
            let mid = low + (high - low) / 2;
            if self.count(suffix(mid)) <= budget {
                high = mid;
            } else {
                low = mid + 1;
            }
        }

        if high == boundaries.len() {
            ""
        } else {
            suffix(high)
        }
    }
}

fn whitespace_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}
