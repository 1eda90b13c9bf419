//! Avatar RAG - the content pipeline behind a creator's AI avatar
//!
//! Ingests a creator's YouTube transcripts, Instagram captions, and custom
//! text, and answers audience messages in the creator's voice grounded in
//! that content.
//!
//! # Overview
//!
//! - Ingestion: fetch → clean → chunk → embed → store
//! - Query: embed → owner-scoped similarity search → bounded context →
//!   persona-shaped completion → history
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `normalize` - Text cleanup and token estimates
//! - `chunking` - Overlapping boundary-aware chunks
//! - `embedding` - Guarded, batched embedding generation
//! - `llm` - Chat completion provider
//! - `sources` - YouTube and Instagram content fetchers
//! - `vector_store` - Owner-scoped vector storage (SQLite, in-memory)
//! - `rag` - Context assembly and response generation
//! - `orchestrator` - Pipeline coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use avatar_rag::config::Settings;
//! use avatar_rag::orchestrator::{IngestRequest, Orchestrator};
//! use avatar_rag::rag::QueryOptions;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let result = orchestrator
//!         .ingest(IngestRequest::custom_text("creator-1", "My training week starts every Sunday..."))
//!         .await;
//!     println!("Stored {} chunks", result.chunks_processed);
//!
//!     let answer = orchestrator
//!         .query("When do you plan your week?", "creator-1", &QueryOptions::default())
//!         .await?;
//!     println!("{}", answer.response);
//!
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod normalize;
pub mod openai;
pub mod orchestrator;
pub mod rag;
pub mod sources;
pub mod vector_store;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{AvatarError, Result};
