//! Embedding generation for semantic search and retrieval.

mod generator;
mod openai;

pub use generator::EmbeddingGenerator;
pub use openai::OpenAIEmbedder;

use crate::error::{AvatarError, ProviderErrorKind, Result};
use async_trait::async_trait;

/// An external embedding provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AvatarError::EmbeddingProvider {
                kind: ProviderErrorKind::Other,
                message: "Empty embedding response".to_string(),
            })
    }

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Name of the embedding model.
    fn model(&self) -> &str;
}
