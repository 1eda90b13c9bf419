//! In-memory vector store implementation.
//!
//! Useful for testing and short-lived sessions.

use super::{
    filter_and_rank, ContentSource, QueryRecord, RankedChunk, SearchOptions, SourceSummary, StoredChunk,
    StoredChunkRef, VectorStore,
};
use crate::chunking::EmbeddedChunk;
use crate::error::{AvatarError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    sources: HashMap<Uuid, ContentSource>,
    chunks: HashMap<Uuid, Vec<StoredChunk>>,
    history: Vec<QueryRecord>,
}

/// In-memory vector store.
#[derive(Default)]
pub struct MemoryVectorStore {
    tables: RwLock<Tables>,
}

impl MemoryVectorStore {
    /// Create a new in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|e| AvatarError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|e| AvatarError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }
}

fn owned<'a>(tables: &'a Tables, content_id: Uuid, owner_id: &str) -> Option<&'a ContentSource> {
    tables
        .sources
        .get(&content_id)
        .filter(|s| s.owner_id == owner_id)
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn store_source(&self, source: &ContentSource) -> Result<()> {
        let mut tables = self.write()?;
        if tables.sources.contains_key(&source.id) {
            return Err(AvatarError::VectorStore(format!("Content source {} already exists", source.id)));
        }
        tables.sources.insert(source.id, source.clone());
        Ok(())
    }

    async fn store_chunks(&self, source: &ContentSource, chunks: &[EmbeddedChunk]) -> Result<Vec<StoredChunkRef>> {
        let mut tables = self.write()?;
        if owned(&tables, source.id, &source.owner_id).is_none() {
            return Err(AvatarError::VectorStore(format!("Unknown content source {}", source.id)));
        }

        let mut taken: HashSet<usize> = tables
            .chunks
            .get(&source.id)
            .map(|existing| existing.iter().map(|c| c.chunk_index).collect())
            .unwrap_or_default();
        if let Some(dup) = chunks.iter().find(|c| !taken.insert(c.chunk().index)) {
            return Err(AvatarError::VectorStore(format!(
                "Duplicate chunk index {} for {}",
                dup.chunk().index,
                source.id
            )));
        }

        let now = super::now();
        let stored: Vec<StoredChunk> = chunks
            .iter()
            .map(|c| StoredChunk::from_embedded(source, c, now))
            .collect();
        let refs = stored
            .iter()
            .map(|c| StoredChunkRef {
                id: c.id,
                chunk_index: c.chunk_index,
            })
            .collect();

        tables.chunks.entry(source.id).or_default().extend(stored);
        Ok(refs)
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        owner_id: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RankedChunk>> {
        let tables = self.read()?;

        let candidates = tables
            .sources
            .values()
            .filter(|s| s.owner_id == owner_id)
            .flat_map(|source| {
                tables
                    .chunks
                    .get(&source.id)
                    .into_iter()
                    .flatten()
                    .map(move |chunk| (chunk.clone(), source.clone()))
            });

        Ok(filter_and_rank(candidates, query_embedding, owner_id, options))
    }

    async fn record_history(&self, record: &QueryRecord) -> Result<()> {
        self.write()?.history.push(record.clone());
        Ok(())
    }

    async fn list_history(&self, owner_id: &str, limit: usize) -> Result<Vec<QueryRecord>> {
        let tables = self.read()?;
        Ok(tables
            .history
            .iter()
            .rev()
            .filter(|r| r.owner_id == owner_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_sources(&self, owner_id: &str) -> Result<Vec<SourceSummary>> {
        let tables = self.read()?;
        let mut summaries: Vec<SourceSummary> = tables
            .sources
            .values()
            .filter(|s| s.owner_id == owner_id)
            .map(|source| SourceSummary {
                source: source.clone(),
                chunk_count: tables.chunks.get(&source.id).map_or(0, Vec::len),
            })
            .collect();

        summaries.sort_by(|a, b| b.source.created_at.cmp(&a.source.created_at));
        Ok(summaries)
    }

    async fn get_source(&self, content_id: Uuid, owner_id: &str) -> Result<Option<ContentSource>> {
        let tables = self.read()?;
        Ok(owned(&tables, content_id, owner_id).cloned())
    }

    async fn get_chunks(&self, content_id: Uuid, owner_id: &str) -> Result<Vec<StoredChunk>> {
        let tables = self.read()?;
        if owned(&tables, content_id, owner_id).is_none() {
            return Ok(Vec::new());
        }

        let mut chunks = tables.chunks.get(&content_id).cloned().unwrap_or_default();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn delete_source(&self, content_id: Uuid, owner_id: &str) -> Result<bool> {
        let mut tables = self.write()?;
        if owned(&tables, content_id, owner_id).is_none() {
            return Ok(false);
        }

        tables.sources.remove(&content_id);
        tables.chunks.remove(&content_id);
        Ok(true)
    }

    async fn chunk_count(&self, owner_id: &str) -> Result<usize> {
        let tables = self.read()?;
        Ok(tables
            .sources
            .values()
            .filter(|s| s.owner_id == owner_id)
            .map(|s| tables.chunks.get(&s.id).map_or(0, Vec::len))
            .sum())
    }
}
