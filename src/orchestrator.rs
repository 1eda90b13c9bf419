//! Pipeline orchestrator for the avatar.
//!
//! Coordinates ingestion from fetch to storage, and delegates queries to the
//! RAG engine. Ingestion errors are reported per source as [`IngestResult`]s
//! so batches keep going after a failure; query errors propagate.

use crate::chunking::{chunk_text, ChunkingConfig};
use crate::config::{Prompts, Settings};
use crate::embedding::{Embedder, EmbeddingGenerator, OpenAIEmbedder};
use crate::error::{AvatarError, Result};
use crate::llm::{ChatModel, CompletionParams, OpenAIChatModel};
use crate::normalize::{clean, clean_transcript};
use crate::rag::{ContextAssembler, QueryOptions, QueryResponse, RagEngine, ResponseGenerator};
use crate::sources::{FetcherRegistry, SourceMetadata, SourceType};
use crate::vector_store::{
    open_vector_store, ContentSource, QueryRecord, RankedChunk, SearchOptions, SourceSummary, StoredChunk,
    VectorStore,
};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// A request to ingest one source for one owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub owner_id: String,
    pub source_type: SourceType,
    /// Provider identifier. Generated for custom text when absent.
    #[serde(default)]
    pub source_id: Option<String>,
    /// Inline text. Required for custom text, used instead of fetching otherwise.
    #[serde(default)]
    pub text: Option<String>,
    /// Overrides the fetched title.
    #[serde(default)]
    pub label: Option<String>,
    /// Extra metadata stored with the source.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl IngestRequest {
    /// Request for a fetched source.
    pub fn source(owner_id: impl Into<String>, source_type: SourceType, source_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            source_type,
            source_id: Some(source_id.into()),
            text: None,
            label: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Request for raw text supplied by the caller.
    pub fn custom_text(owner_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            source_type: SourceType::CustomText,
            source_id: None,
            text: Some(text.into()),
            label: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Display name for logs and results.
    fn describe(&self) -> String {
        match &self.source_id {
            Some(id) => format!("{} {}", self.source_type, id),
            None => self.source_type.to_string(),
        }
    }
}

/// Outcome of ingesting one source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestResult {
    pub success: bool,
    pub content_id: Option<Uuid>,
    /// Provider identifier the result refers to.
    pub source_id: Option<String>,
    pub chunks_processed: usize,
    pub total_tokens: usize,
    pub error: Option<String>,
}

impl IngestResult {
    fn failed(source_id: Option<String>, error: &AvatarError) -> Self {
        Self {
            success: false,
            source_id,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// The main orchestrator for the avatar pipeline.
pub struct Orchestrator {
    settings: Settings,
    embeddings: Arc<EmbeddingGenerator>,
    store: Arc<dyn VectorStore>,
    fetchers: FetcherRegistry,
    engine: RagEngine,
    chunking: ChunkingConfig,
}

impl Orchestrator {
    /// Create an orchestrator backed by OpenAI and the configured store.
    pub fn new(settings: Settings) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAIEmbedder::new(&settings.openai, &settings.embedding)?);
        let chat: Arc<dyn ChatModel> = Arc::new(OpenAIChatModel::new(&settings.openai)?);
        let store = open_vector_store(&settings)?;
        let fetchers = FetcherRegistry::from_settings(&settings)?;

        info!(
            "Using {} embeddings and {} for replies",
            settings.embedding.model, settings.generation.model
        );

        Self::with_components(settings, embedder, chat, store, fetchers)
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        store: Arc<dyn VectorStore>,
        fetchers: FetcherRegistry,
    ) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let embeddings = Arc::new(EmbeddingGenerator::new(embedder, &settings.embedding));
        let responder =
            ResponseGenerator::new(chat, CompletionParams::from(&settings.generation)).with_prompts(prompts);
        let engine = RagEngine::new(
            embeddings.clone(),
            store.clone(),
            ContextAssembler::new(&settings.context),
            responder,
        )
        .with_persona(settings.persona.clone())
        .with_search_defaults(SearchOptions::from(&settings.retrieval))
        .with_history(settings.generation.record_history);

        Ok(Self {
            chunking: ChunkingConfig::from(&settings.chunking),
            settings,
            embeddings,
            store,
            fetchers,
            engine,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn vector_store(&self) -> Arc<dyn VectorStore> {
        self.store.clone()
    }

    pub fn engine(&self) -> &RagEngine {
        &self.engine
    }

    /// Ingest one source. Never fails; errors are reported in the result.
    #[instrument(skip(self, request), fields(owner_id = %request.owner_id, source = %request.describe()))]
    pub async fn ingest(&self, request: IngestRequest) -> IngestResult {
        let source_id = request.source_id.clone();
        match self.try_ingest(request).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Ingestion failed: {}", e);
                IngestResult::failed(source_id, &e)
            }
        }
    }

    async fn try_ingest(&self, request: IngestRequest) -> Result<IngestResult> {
        if request.owner_id.trim().is_empty() {
            return Err(AvatarError::InvalidInput("owner_id must not be empty".to_string()));
        }

        let (source_id, raw, metadata) = self.fetch(&request).await?;

        let text = if request.source_type.is_transcript() {
            clean_transcript(&raw)
        } else {
            clean(&raw)
        };
        let chars = text.chars().count();
        if chars < self.settings.chunking.min_content_chars {
            return Err(AvatarError::InsufficientContent(format!(
                "{} characters after cleaning, at least {} required",
                chars, self.settings.chunking.min_content_chars
            )));
        }

        let chunks = chunk_text(&text, &self.chunking);
        let total_tokens = chunks.iter().map(|c| c.token_estimate).sum();
        info!("Split {} characters into {} chunks", chars, chunks.len());

        // Embed everything before the first write so a provider failure stores nothing.
        let embedded = self.embeddings.embed_chunks(chunks).await?;

        let label = request
            .label
            .clone()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(metadata.title);
        let mut source = ContentSource::new(&request.owner_id, request.source_type, source_id.clone(), label);
        source.url = metadata.url;
        source.published_at = metadata.published_at;
        source.metadata = metadata.extra;
        source.metadata.extend(request.metadata);

        self.store.store_source(&source).await?;
        if let Err(e) = self.store.store_chunks(&source, &embedded).await {
            if let Err(cleanup) = self.store.delete_source(source.id, &source.owner_id).await {
                warn!("Failed to remove source {} after chunk write error: {}", source.id, cleanup);
            }
            return Err(e);
        }

        info!("Stored {} chunks for content {}", embedded.len(), source.id);

        Ok(IngestResult {
            success: true,
            content_id: Some(source.id),
            source_id: Some(source_id),
            chunks_processed: embedded.len(),
            total_tokens,
            error: None,
        })
    }

    /// Resolve the source ID, raw text, and metadata of a request.
    async fn fetch(&self, request: &IngestRequest) -> Result<(String, String, SourceMetadata)> {
        if request.source_type == SourceType::CustomText {
            let text = request
                .text
                .clone()
                .ok_or_else(|| AvatarError::InvalidInput("custom_text requires text".to_string()))?;
            let source_id = request
                .source_id
                .clone()
                .unwrap_or_else(|| format!("custom-{}", Uuid::new_v4()));
            let metadata = SourceMetadata {
                title: "Custom text".to_string(),
                ..SourceMetadata::default()
            };
            return Ok((source_id, text, metadata));
        }

        let source_id = request
            .source_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| AvatarError::InvalidInput(format!("{} requires a source_id", request.source_type)))?;
        let fetcher = self.fetchers.for_type(request.source_type)?;

        let metadata = fetcher.get_metadata(request.source_type, &source_id).await?;
        let text = match &request.text {
            Some(text) => text.clone(),
            None => fetcher.get_text(request.source_type, &source_id).await?,
        };

        Ok((source_id, text, metadata))
    }

    /// Ingest several sources, up to `ingest.concurrency` at a time.
    ///
    /// Results are returned in request order.
    pub async fn ingest_batch(&self, requests: Vec<IngestRequest>) -> Vec<IngestResult> {
        let total = requests.len();
        let results: Vec<IngestResult> = stream::iter(requests)
            .map(|request| self.ingest(request))
            .buffered(self.settings.ingest.concurrency.max(1))
            .collect()
            .await;

        let succeeded = results.iter().filter(|r| r.success).count();
        info!("Batch ingestion finished: {}/{} succeeded", succeeded, total);
        results
    }

    /// Ingest every item of a collection (a channel's videos, an account's posts).
    #[instrument(skip(self))]
    pub async fn ingest_collection(
        &self,
        source_type: SourceType,
        collection_id: &str,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<IngestResult>> {
        let item_type = source_type
            .item_type()
            .ok_or_else(|| AvatarError::InvalidInput(format!("{} is not a collection", source_type)))?;
        let fetcher = self.fetchers.for_type(source_type)?;
        let items = fetcher.list_items(source_type, collection_id, limit).await?;
        info!("Found {} items in {}", items.len(), collection_id);

        let requests = items
            .into_iter()
            .map(|id| IngestRequest::source(owner_id, item_type, id))
            .collect();
        Ok(self.ingest_batch(requests).await)
    }

    /// Answer a message as the owner's avatar.
    pub async fn query(&self, message: &str, owner_id: &str, options: &QueryOptions) -> Result<QueryResponse> {
        self.engine.query(message, owner_id, options).await
    }

    /// Retrieve the owner's most relevant chunks. Unset options use the configured defaults.
    pub async fn search(&self, query: &str, owner_id: &str, options: &QueryOptions) -> Result<Vec<RankedChunk>> {
        let defaults = SearchOptions::from(&self.settings.retrieval);
        self.engine
            .search(query, owner_id, &options.search_options(&defaults))
            .await
    }

    pub async fn list_sources(&self, owner_id: &str) -> Result<Vec<SourceSummary>> {
        self.store.list_sources(owner_id).await
    }

    pub async fn get_source(&self, content_id: Uuid, owner_id: &str) -> Result<Option<ContentSource>> {
        self.store.get_source(content_id, owner_id).await
    }

    pub async fn get_chunks(&self, content_id: Uuid, owner_id: &str) -> Result<Vec<StoredChunk>> {
        self.store.get_chunks(content_id, owner_id).await
    }

    /// Delete a source and its chunks.
    #[instrument(skip(self))]
    pub async fn delete_source(&self, content_id: Uuid, owner_id: &str) -> Result<bool> {
        let deleted = self.store.delete_source(content_id, owner_id).await?;
        if deleted {
            info!("Deleted content {}", content_id);
        }
        Ok(deleted)
    }

    /// Most recent queries of an owner.
    pub async fn history(&self, owner_id: &str, limit: usize) -> Result<Vec<QueryRecord>> {
        self.store.list_history(owner_id, limit).await
    }

    /// Summarize auxiliary content.
    pub async fn summarize(&self, text: &str, max_length: usize) -> Result<String> {
        self.engine.responder().summarize(text, max_length).await
    }
}
