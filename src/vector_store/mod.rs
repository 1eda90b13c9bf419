//! Vector store abstraction.
//!
//! Provides a trait-based interface over owner-scoped storage of content
//! sources, embedded chunks, and query history. Every read takes an owner ID,
//! and the shared [`filter_and_rank`] re-checks ownership on every candidate.

mod memory;
mod sqlite;

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use crate::chunking::EmbeddedChunk;
use crate::config::{RetrievalSettings, Settings};
use crate::error::{AvatarError, Result};
use crate::sources::SourceType;
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Current time at the microsecond precision the stores persist.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// One ingested origin of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSource {
    /// Content ID referenced by every chunk of this source.
    pub id: Uuid,
    pub owner_id: String,
    pub source_type: SourceType,
    /// Provider identifier, or `custom-<uuid>` for custom text.
    pub source_id: String,
    /// Human-readable title.
    pub label: String,
    pub url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl ContentSource {
    pub fn new(
        owner_id: impl Into<String>,
        source_type: SourceType,
        source_id: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            source_type,
            source_id: source_id.into(),
            label: label.into(),
            url: None,
            published_at: None,
            metadata: serde_json::Map::new(),
            created_at: now(),
        }
    }

    /// Date used for date-range filters: publication time, else ingestion time.
    pub fn effective_date(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.created_at)
    }
}

/// A persisted chunk of a content source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: Uuid,
    pub content_id: Uuid,
    pub owner_id: String,
    /// Document order within the source.
    pub chunk_index: usize,
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
    pub token_estimate: usize,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl StoredChunk {
    fn from_embedded(source: &ContentSource, embedded: &EmbeddedChunk, created_at: DateTime<Utc>) -> Self {
        let chunk = embedded.chunk();
        Self {
            id: Uuid::new_v4(),
            content_id: source.id,
            owner_id: source.owner_id.clone(),
            chunk_index: chunk.index,
            text: chunk.text.clone(),
            start_char: chunk.start_char,
            end_char: chunk.end_char,
            token_estimate: chunk.token_estimate,
            embedding: embedded.embedding().to_vec(),
            created_at,
        }
    }
}

/// Identifier assigned to a stored chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChunkRef {
    pub id: Uuid,
    pub chunk_index: usize,
}

/// A search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedChunk {
    pub chunk: StoredChunk,
    pub source: ContentSource,
    /// Cosine similarity to the query (higher is better).
    pub similarity: f32,
}

/// Inclusive date window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}

/// Similarity search parameters.
///
/// Empty `content_types` / `content_ids` mean no restriction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Chunks must score strictly above this.
    pub threshold: f32,
    pub match_count: usize,
    pub content_types: Vec<SourceType>,
    pub content_ids: Vec<Uuid>,
    pub date_range: Option<DateRange>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            match_count: 5,
            content_types: Vec::new(),
            content_ids: Vec::new(),
            date_range: None,
        }
    }
}

impl From<&RetrievalSettings> for SearchOptions {
    fn from(settings: &RetrievalSettings) -> Self {
        Self {
            threshold: settings.threshold,
            match_count: settings.match_count,
            ..Self::default()
        }
    }
}

impl SearchOptions {
    /// Whether a source passes the type, id, and date filters.
    pub fn matches_source(&self, source: &ContentSource) -> bool {
        (self.content_types.is_empty() || self.content_types.contains(&source.source_type))
            && (self.content_ids.is_empty() || self.content_ids.contains(&source.id))
            && self
                .date_range
                .is_none_or(|range| range.contains(source.effective_date()))
    }
}

/// One answered query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub query_text: String,
    #[serde(skip)]
    pub query_embedding: Vec<f32>,
    pub response_text: String,
    /// Ordered by similarity, best first.
    pub retrieved_chunk_ids: Vec<Uuid>,
    pub has_context: bool,
    pub created_at: DateTime<Utc>,
}

impl QueryRecord {
    pub fn new(
        owner_id: impl Into<String>,
        query_text: impl Into<String>,
        query_embedding: Vec<f32>,
        response_text: impl Into<String>,
        retrieved_chunk_ids: Vec<Uuid>,
    ) -> Self {
        let has_context = !retrieved_chunk_ids.is_empty();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            query_text: query_text.into(),
            query_embedding,
            response_text: response_text.into(),
            retrieved_chunk_ids,
            has_context,
            created_at: now(),
        }
    }
}

/// A source with its chunk count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    #[serde(flatten)]
    pub source: ContentSource,
    pub chunk_count: usize,
}

/// Trait for vector store implementations.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persist source-level metadata.
    async fn store_source(&self, source: &ContentSource) -> Result<()>;

    /// Persist all chunks of a source, or none of them.
    async fn store_chunks(&self, source: &ContentSource, chunks: &[EmbeddedChunk]) -> Result<Vec<StoredChunkRef>>;

    /// Owner-scoped similarity search.
    async fn search(
        &self,
        query_embedding: &[f32],
        owner_id: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RankedChunk>>;

    /// Append a query to the owner's history.
    async fn record_history(&self, record: &QueryRecord) -> Result<()>;

    /// Most recent queries first.
    async fn list_history(&self, owner_id: &str, limit: usize) -> Result<Vec<QueryRecord>>;

    /// All sources of an owner, newest first.
    async fn list_sources(&self, owner_id: &str) -> Result<Vec<SourceSummary>>;

    async fn get_source(&self, content_id: Uuid, owner_id: &str) -> Result<Option<ContentSource>>;

    /// Chunks of a source in document order.
    async fn get_chunks(&self, content_id: Uuid, owner_id: &str) -> Result<Vec<StoredChunk>>;

    /// Delete a source and its chunks. Returns whether anything was deleted.
    async fn delete_source(&self, content_id: Uuid, owner_id: &str) -> Result<bool>;

    /// Total chunks stored for an owner.
    async fn chunk_count(&self, owner_id: &str) -> Result<usize>;
}

/// Compute cosine similarity between two vectors.
///
/// Empty, zero-norm, or mismatched-length inputs score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (norm_a * norm_b);
    if similarity.is_nan() {
        0.0
    } else {
        similarity.clamp(-1.0, 1.0)
    }
}

/// Filter candidates to the owner and options, score them, and keep the best.
///
/// Results score strictly above the threshold, are sorted by similarity
/// descending (ties by source and chunk order), and number at most
/// `match_count`.
pub fn filter_and_rank(
    candidates: impl IntoIterator<Item = (StoredChunk, ContentSource)>,
    query_embedding: &[f32],
    owner_id: &str,
    options: &SearchOptions,
) -> Vec<RankedChunk> {
    let mut ranked: Vec<RankedChunk> = candidates
        .into_iter()
        .filter(|(chunk, source)| {
            chunk.owner_id == owner_id && source.owner_id == owner_id && chunk.content_id == source.id
        })
        .filter(|(_, source)| options.matches_source(source))
        .map(|(chunk, source)| {
            let similarity = cosine_similarity(query_embedding, &chunk.embedding);
            RankedChunk {
                chunk,
                source,
                similarity,
            }
        })
        .filter(|r| r.similarity > options.threshold)
        .collect();

    ranked.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.chunk.content_id.cmp(&b.chunk.content_id))
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
    ranked.truncate(options.match_count);
    ranked
}

/// Build the configured vector store.
pub fn open_vector_store(settings: &Settings) -> Result<Arc<dyn VectorStore>> {
    match settings.vector_store.provider.as_str() {
        "sqlite" => {
            let path = settings
                .sqlite_path()
                .ok_or_else(|| AvatarError::NotConfigured("vector_store.sqlite_path".to_string()))?;
            Ok(Arc::new(SqliteVectorStore::new(&path)?))
        }
        "memory" => {
            info!("Using in-memory vector store; content will not persist");
            Ok(Arc::new(MemoryVectorStore::new()))
        }
        other => Err(AvatarError::Config(format!("Unknown vector store provider: {}", other))),
    }
}
