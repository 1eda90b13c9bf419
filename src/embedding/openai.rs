//! OpenAI embeddings implementation.

use super::Embedder;
use crate::config::{EmbeddingSettings, OpenAISettings};
use crate::error::{AvatarError, ProviderErrorKind, Result};
use crate::openai::{classify_error, create_client};
use async_openai::types::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// OpenAI-based embedder.
pub struct OpenAIEmbedder {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    dimensions: usize,
}

impl OpenAIEmbedder {
    /// Create an embedder from explicit settings.
    pub fn new(openai: &OpenAISettings, embedding: &EmbeddingSettings) -> Result<Self> {
        Ok(Self {
            client: create_client(openai)?,
            model: embedding.model.clone(),
            dimensions: embedding.dimensions as usize,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    #[instrument(skip(self, texts), fields(count = texts.len(), model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Requesting embeddings for {} texts", texts.len());

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(texts.to_vec()))
            .dimensions(self.dimensions as u32)
            .build()
            .map_err(|e| AvatarError::EmbeddingProvider {
                kind: ProviderErrorKind::InvalidRequest,
                message: format!("Failed to build request: {}", e),
            })?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| AvatarError::EmbeddingProvider {
                kind: classify_error(&e),
                message: e.to_string(),
            })?;

        // Sort by index to ensure correct order
        let mut data = response.data;
        data.sort_by_key(|e| e.index);

        let embeddings: Vec<Vec<f32>> = data.into_iter().map(|e| e.embedding).collect();
        debug!("Received {} embeddings", embeddings.len());
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedder_creation() {
        let openai = OpenAISettings {
            api_key: Some("sk-test".to_string()),
            ..OpenAISettings::default()
        };
        let embedder = OpenAIEmbedder::new(&openai, &EmbeddingSettings::default()).unwrap();
        assert_eq!(embedder.dimensions(), 1536);
        assert_eq!(embedder.model(), "text-embedding-3-small");

        let large = EmbeddingSettings {
            model: "text-embedding-3-large".to_string(),
            dimensions: 3072,
            ..EmbeddingSettings::default()
        };
        let embedder = OpenAIEmbedder::new(&openai, &large).unwrap();
        assert_eq!(embedder.dimensions(), 3072);
    }
}
