//! Content chunking for breaking normalized text into embeddable segments.

mod window;

pub use window::chunk_text;
pub(crate) use window::floor_char_boundary;

use crate::config::ChunkingSettings;
use crate::normalize::estimate_token_count;
use serde::{Deserialize, Serialize};

/// A segment of normalized source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentChunk {
    /// Position of this chunk in the document.
    pub index: usize,
    /// Trimmed text content of this chunk.
    pub text: String,
    /// Byte offset where the chunk window starts in the source text.
    pub start_char: usize,
    /// Byte offset where the chunk window ends (exclusive).
    pub end_char: usize,
    /// Approximate token count of `text`.
    pub token_estimate: usize,
}

impl ContentChunk {
    /// Create a new content chunk.
    pub fn new(index: usize, text: &str, start_char: usize, end_char: usize) -> Self {
        Self {
            index,
            text: text.to_string(),
            start_char,
            end_char,
            token_estimate: estimate_token_count(text),
        }
    }
}

/// A chunk paired with its embedding.
///
/// Only the embedding generator creates these, and the embedding cannot be
/// replaced afterwards, so every chunk handed to a store carries a vector.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    chunk: ContentChunk,
    embedding: Vec<f32>,
}

impl EmbeddedChunk {
    pub(crate) fn new(chunk: ContentChunk, embedding: Vec<f32>) -> Self {
        Self { chunk, embedding }
    }

    pub fn chunk(&self) -> &ContentChunk {
        &self.chunk
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }
}

/// Configuration for chunking.
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in bytes.
    pub chunk_size: usize,
    /// Bytes carried over from the end of one chunk into the next.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            overlap: 150,
        }
    }
}

impl From<&ChunkingSettings> for ChunkingConfig {
    fn from(settings: &ChunkingSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            overlap: settings.overlap,
        }
    }
}
