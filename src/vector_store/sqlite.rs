//! SQLite-based vector store implementation.
//!
//! Owner, type, ID, and date filters run in SQL; cosine similarity is
//! computed in Rust over the remaining candidates.

use super::{
    filter_and_rank, ContentSource, QueryRecord, RankedChunk, SearchOptions, SourceSummary, StoredChunk,
    StoredChunkRef, VectorStore,
};
use crate::chunking::EmbeddedChunk;
use crate::error::{AvatarError, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS content_sources (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        source_type TEXT NOT NULL,
        source_id TEXT NOT NULL,
        label TEXT NOT NULL,
        url TEXT,
        published_at TEXT,
        metadata TEXT NOT NULL,
        created_at TEXT NOT NULL,
        effective_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_sources_owner ON content_sources(owner_id, created_at);

    CREATE TABLE IF NOT EXISTS content_chunks (
        id TEXT PRIMARY KEY,
        content_id TEXT NOT NULL REFERENCES content_sources(id) ON DELETE CASCADE,
        owner_id TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        text TEXT NOT NULL,
        start_char INTEGER NOT NULL,
        end_char INTEGER NOT NULL,
        token_estimate INTEGER NOT NULL,
        embedding BLOB NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_chunks_content ON content_chunks(content_id, chunk_index);
    CREATE INDEX IF NOT EXISTS idx_chunks_owner ON content_chunks(owner_id);

    CREATE TABLE IF NOT EXISTS query_history (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        query_text TEXT NOT NULL,
        query_embedding BLOB NOT NULL,
        response_text TEXT NOT NULL,
        retrieved_chunk_ids TEXT NOT NULL,
        has_context INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_history_owner ON query_history(owner_id, created_at);
"#;

const SOURCE_COLUMNS: &str =
    "s.id, s.owner_id, s.source_type, s.source_id, s.label, s.url, s.published_at, s.metadata, s.created_at";

const CHUNK_COLUMNS: &str = "c.id, c.content_id, c.owner_id, c.chunk_index, c.text, c.start_char, c.end_char, \
     c.token_estimate, c.embedding, c.created_at";

/// Fixed-width timestamps so that text comparison in SQL orders correctly.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    e: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}

fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))
}

fn time_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn optional_time_at(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn source_from_row(row: &Row, offset: usize) -> rusqlite::Result<ContentSource> {
    let source_type: String = row.get(offset + 2)?;
    let metadata: String = row.get(offset + 7)?;

    Ok(ContentSource {
        id: uuid_at(row, offset)?,
        owner_id: row.get(offset + 1)?,
        source_type: source_type.parse().map_err(|e: String| conversion_error(offset + 2, e))?,
        source_id: row.get(offset + 3)?,
        label: row.get(offset + 4)?,
        url: row.get(offset + 5)?,
        published_at: optional_time_at(row, offset + 6)?,
        metadata: serde_json::from_str(&metadata).map_err(|e| conversion_error(offset + 7, e))?,
        created_at: time_at(row, offset + 8)?,
    })
}

fn chunk_from_row(row: &Row, offset: usize) -> rusqlite::Result<StoredChunk> {
    let embedding: Vec<u8> = row.get(offset + 8)?;

    Ok(StoredChunk {
        id: uuid_at(row, offset)?,
        content_id: uuid_at(row, offset + 1)?,
        owner_id: row.get(offset + 2)?,
        chunk_index: row.get::<_, i64>(offset + 3)? as usize,
        text: row.get(offset + 4)?,
        start_char: row.get::<_, i64>(offset + 5)? as usize,
        end_char: row.get::<_, i64>(offset + 6)? as usize,
        token_estimate: row.get::<_, i64>(offset + 7)? as usize,
        embedding: bytes_to_embedding(&embedding),
        created_at: time_at(row, offset + 9)?,
    })
}

fn history_from_row(row: &Row) -> rusqlite::Result<QueryRecord> {
    let embedding: Vec<u8> = row.get(3)?;
    let chunk_ids: String = row.get(5)?;

    Ok(QueryRecord {
        id: uuid_at(row, 0)?,
        owner_id: row.get(1)?,
        query_text: row.get(2)?,
        query_embedding: bytes_to_embedding(&embedding),
        response_text: row.get(4)?,
        retrieved_chunk_ids: serde_json::from_str(&chunk_ids).map_err(|e| conversion_error(5, e))?,
        has_context: row.get(6)?,
        created_at: time_at(row, 7)?,
    })
}

/// Serialize embedding to bytes.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize embedding from bytes.
fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
            f32::from_le_bytes(arr)
        })
        .collect()
}

/// SQLite-based vector store.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Open or create a store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self::init(conn)?;

        info!("Initialized SQLite vector store at {:?}", path);
        Ok(store)
    }

    /// Create an in-memory SQLite vector store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AvatarError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    #[instrument(skip(self, source), fields(content_id = %source.id))]
    async fn store_source(&self, source: &ContentSource) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO content_sources
            (id, owner_id, source_type, source_id, label, url, published_at, metadata, created_at, effective_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                source.id.to_string(),
                source.owner_id,
                source.source_type.as_str(),
                source.source_id,
                source.label,
                source.url,
                source.published_at.as_ref().map(timestamp),
                serde_json::to_string(&source.metadata)?,
                timestamp(&source.created_at),
                timestamp(&source.effective_date()),
            ],
        )?;

        debug!("Stored content source {}", source.id);
        Ok(())
    }

    #[instrument(skip(self, source, chunks), fields(content_id = %source.id, count = chunks.len()))]
    async fn store_chunks(&self, source: &ContentSource, chunks: &[EmbeddedChunk]) -> Result<Vec<StoredChunkRef>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = super::now();
        let mut refs = Vec::with_capacity(chunks.len());

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO content_chunks
                (id, content_id, owner_id, chunk_index, text, start_char, end_char,
                 token_estimate, embedding, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )?;

            for embedded in chunks {
                let chunk = StoredChunk::from_embedded(source, embedded, now);
                stmt.execute(params![
                    chunk.id.to_string(),
                    chunk.content_id.to_string(),
                    chunk.owner_id,
                    chunk.chunk_index as i64,
                    chunk.text,
                    chunk.start_char as i64,
                    chunk.end_char as i64,
                    chunk.token_estimate as i64,
                    embedding_to_bytes(&chunk.embedding),
                    timestamp(&chunk.created_at),
                ])?;
                refs.push(StoredChunkRef {
                    id: chunk.id,
                    chunk_index: chunk.chunk_index,
                });
            }
        }

        tx.commit()?;
        info!("Stored {} chunks for {}", refs.len(), source.id);
        Ok(refs)
    }

    #[instrument(skip(self, query_embedding, options))]
    async fn search(
        &self,
        query_embedding: &[f32],
        owner_id: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RankedChunk>> {
        let mut sql = format!(
            "SELECT {}, {} FROM content_chunks c JOIN content_sources s ON s.id = c.content_id \
             WHERE c.owner_id = ? AND s.owner_id = ?",
            CHUNK_COLUMNS, SOURCE_COLUMNS
        );
        let mut args: Vec<String> = vec![owner_id.to_string(), owner_id.to_string()];

        if !options.content_types.is_empty() {
            sql.push_str(&format!(
                " AND s.source_type IN ({})",
                vec!["?"; options.content_types.len()].join(", ")
            ));
            args.extend(options.content_types.iter().map(|t| t.as_str().to_string()));
        }
        if !options.content_ids.is_empty() {
            sql.push_str(&format!(
                " AND s.id IN ({})",
                vec!["?"; options.content_ids.len()].join(", ")
            ));
            args.extend(options.content_ids.iter().map(|id| id.to_string()));
        }
        if let Some(range) = &options.date_range {
            if let Some(start) = &range.start {
                sql.push_str(" AND s.effective_at >= ?");
                args.push(timestamp(start));
            }
            if let Some(end) = &range.end {
                sql.push_str(" AND s.effective_at <= ?");
                args.push(timestamp(end));
            }
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let candidates = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok((chunk_from_row(row, 0)?, source_from_row(row, 10)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!("Scoring {} candidate chunks", candidates.len());
        Ok(filter_and_rank(candidates, query_embedding, owner_id, options))
    }

    #[instrument(skip(self, record), fields(owner_id = %record.owner_id))]
    async fn record_history(&self, record: &QueryRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO query_history
            (id, owner_id, query_text, query_embedding, response_text, retrieved_chunk_ids, has_context, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.id.to_string(),
                record.owner_id,
                record.query_text,
                embedding_to_bytes(&record.query_embedding),
                record.response_text,
                serde_json::to_string(&record.retrieved_chunk_ids)?,
                record.has_context,
                timestamp(&record.created_at),
            ],
        )?;
        Ok(())
    }

    async fn list_history(&self, owner_id: &str, limit: usize) -> Result<Vec<QueryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, owner_id, query_text, query_embedding, response_text,
                   retrieved_chunk_ids, has_context, created_at
            FROM query_history
            WHERE owner_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )?;

        let records = stmt
            .query_map(params![owner_id, limit as i64], history_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn list_sources(&self, owner_id: &str) -> Result<Vec<SourceSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, (SELECT COUNT(*) FROM content_chunks c WHERE c.content_id = s.id) \
             FROM content_sources s WHERE s.owner_id = ?1 ORDER BY s.created_at DESC",
            SOURCE_COLUMNS
        ))?;

        let summaries = stmt
            .query_map(params![owner_id], |row| {
                Ok(SourceSummary {
                    source: source_from_row(row, 0)?,
                    chunk_count: row.get::<_, i64>(9)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }

    async fn get_source(&self, content_id: Uuid, owner_id: &str) -> Result<Option<ContentSource>> {
        let conn = self.conn()?;
        let source = conn
            .query_row(
                &format!(
                    "SELECT {} FROM content_sources s WHERE s.id = ?1 AND s.owner_id = ?2",
                    SOURCE_COLUMNS
                ),
                params![content_id.to_string(), owner_id],
                |row| source_from_row(row, 0),
            )
            .optional()?;
        Ok(source)
    }

    async fn get_chunks(&self, content_id: Uuid, owner_id: &str) -> Result<Vec<StoredChunk>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM content_chunks c WHERE c.content_id = ?1 AND c.owner_id = ?2 ORDER BY c.chunk_index",
            CHUNK_COLUMNS
        ))?;

        let chunks = stmt
            .query_map(params![content_id.to_string(), owner_id], |row| chunk_from_row(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    #[instrument(skip(self))]
    async fn delete_source(&self, content_id: Uuid, owner_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM content_sources WHERE id = ?1 AND owner_id = ?2",
            params![content_id.to_string(), owner_id],
        )?;

        if deleted > 0 {
            info!("Deleted content source {}", content_id);
        }
        Ok(deleted > 0)
    }

    async fn chunk_count(&self, owner_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM content_chunks WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
