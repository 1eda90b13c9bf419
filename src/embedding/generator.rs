//! Guarded, order-preserving embedding generation.

use super::Embedder;
use crate::chunking::{ContentChunk, EmbeddedChunk};
use crate::config::EmbeddingSettings;
use crate::error::{AvatarError, ProviderErrorKind, Result};
use crate::normalize::{clean, estimate_token_count};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Wraps an [`Embedder`] with normalization, a token-size guard, and batching.
pub struct EmbeddingGenerator {
    embedder: Arc<dyn Embedder>,
    max_input_tokens: usize,
    batch_size: usize,
}

impl EmbeddingGenerator {
    /// Create a generator using the limits from settings.
    pub fn new(embedder: Arc<dyn Embedder>, settings: &EmbeddingSettings) -> Self {
        Self::with_limits(embedder, settings.max_input_tokens, settings.batch_size)
    }

    /// Create a generator with explicit limits.
    pub fn with_limits(embedder: Arc<dyn Embedder>, max_input_tokens: usize, batch_size: usize) -> Self {
        Self {
            embedder,
            max_input_tokens,
            batch_size: batch_size.max(1),
        }
    }

    /// The underlying provider.
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Normalize a text and check it against the input guard.
    pub fn prepare(&self, text: &str) -> Result<String> {
        let cleaned = clean(text);
        if cleaned.is_empty() {
            return Err(AvatarError::InvalidInput("Cannot embed empty text".to_string()));
        }

        let estimated = estimate_token_count(&cleaned);
        if estimated > self.max_input_tokens {
            return Err(AvatarError::ContentTooLarge {
                estimated,
                max: self.max_input_tokens,
            });
        }

        Ok(cleaned)
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| AvatarError::EmbeddingProvider {
            kind: ProviderErrorKind::Other,
            message: "Empty embedding response".to_string(),
        })
    }

    /// Embed several texts, returning vectors in input order.
    ///
    /// Every input is checked before the first provider call, so an oversized
    /// text fails the whole call without spending any provider quota.
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let prepared = texts
            .iter()
            .map(|t| self.prepare(t))
            .collect::<Result<Vec<_>>>()?;

        let mut vectors = Vec::with_capacity(prepared.len());
        for batch in prepared.chunks(self.batch_size) {
            let embeddings = self.embedder.embed_batch(batch).await?;
            self.check_vectors(batch.len(), &embeddings)?;
            vectors.extend(embeddings);
        }

        debug!("Generated {} embeddings", vectors.len());
        Ok(vectors)
    }

    /// Attach an embedding to each chunk, preserving chunk order and text.
    pub async fn embed_chunks(&self, chunks: Vec<ContentChunk>) -> Result<Vec<EmbeddedChunk>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed_many(&texts).await?;

        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| EmbeddedChunk::new(chunk, embedding))
            .collect())
    }

    fn check_vectors(&self, expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
        if vectors.len() != expected {
            return Err(AvatarError::EmbeddingProvider {
                kind: ProviderErrorKind::Other,
                message: format!("Provider returned {} embeddings for {} inputs", vectors.len(), expected),
            });
        }

        let dimensions = self.embedder.dimensions();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
            return Err(AvatarError::EmbeddingProvider {
                kind: ProviderErrorKind::Other,
                message: format!("Expected {} dimensions, got {}", dimensions, bad.len()),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{chunk_text, ChunkingConfig};
    use crate::test_support::HashEmbedder;

    fn generator(embedder: Arc<HashEmbedder>, max_tokens: usize, batch: usize) -> EmbeddingGenerator {
        EmbeddingGenerator::with_limits(embedder, max_tokens, batch)
    }

    #[tokio::test]
    async fn test_rejects_oversized_input_before_calling_provider() {
        let embedder = Arc::new(HashEmbedder::new(8));
        let gen = generator(embedder.clone(), 10, 100);

        let err = gen.embed(&"x".repeat(41)).await.unwrap_err();
        assert!(matches!(err, AvatarError::ContentTooLarge { estimated: 11, max: 10 }));
        assert_eq!(embedder.calls(), 0);

        assert!(gen.embed(&"x".repeat(40)).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_text_is_invalid() {
        let gen = generator(Arc::new(HashEmbedder::new(8)), 8000, 100);
        assert!(matches!(gen.embed("  \n ").await, Err(AvatarError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_batches_preserve_order() {
        let embedder = Arc::new(HashEmbedder::new(16));
        let gen = generator(embedder.clone(), 8000, 2);

        let texts: Vec<String> = ["alpha", "beta", "gamma", "delta", "epsilon"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let vectors = gen.embed_many(&texts).await.unwrap();

        assert_eq!(embedder.calls(), 3);
        assert_eq!(vectors.len(), 5);
        for (text, vector) in texts.iter().zip(&vectors) {
            assert_eq!(vector, &embedder.vector_for(text));
        }
    }

    #[tokio::test]
    async fn test_embed_chunks_keeps_text_and_order() {
        let embedder = Arc::new(HashEmbedder::new(16));
        let gen = generator(embedder.clone(), 8000, 100);

        let text = "One sentence here. ".repeat(40);
        let chunks = chunk_text(text.trim(), &ChunkingConfig { chunk_size: 200, overlap: 20 });
        let originals = chunks.clone();

        let embedded = gen.embed_chunks(chunks).await.unwrap();
        assert_eq!(embedded.len(), originals.len());
        for (e, original) in embedded.iter().zip(&originals) {
            assert_eq!(e.chunk(), original);
            assert_eq!(e.embedding().len(), 16);
        }
    }

    #[tokio::test]
    async fn test_provider_error_kind_is_preserved() {
        let embedder = Arc::new(HashEmbedder::failing(8, ProviderErrorKind::RateLimit));
        let gen = generator(embedder, 8000, 100);

        let err = gen.embed("hello").await.unwrap_err();
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::RateLimit));
    }

    #[tokio::test]
    async fn test_wrong_dimensions_rejected() {
        let embedder = Arc::new(HashEmbedder::new(8).reporting_dimensions(1536));
        let gen = generator(embedder, 8000, 100);
        assert!(matches!(
            gen.embed("hello").await,
            Err(AvatarError::EmbeddingProvider { kind: ProviderErrorKind::Other, .. })
        ));
    }
}
