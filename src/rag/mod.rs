//! Retrieval-augmented answering in the avatar's voice.
//!
//! A query is embedded, matched against the owner's chunks, packed into a
//! bounded context, and answered by the chat model under the persona prompt.

mod context;
mod persona;
mod response;

pub use context::{AssembledContext, ContextAssembler};
pub use persona::{PersonaConfig, ResponseLength};
pub use response::ResponseGenerator;

use crate::embedding::EmbeddingGenerator;
use crate::error::{AvatarError, Result};
use crate::sources::SourceType;
use crate::vector_store::{DateRange, QueryRecord, RankedChunk, SearchOptions, VectorStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Per-query overrides. Unset fields fall back to configured defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub threshold: Option<f32>,
    pub match_count: Option<usize>,
    pub content_types: Vec<SourceType>,
    pub content_ids: Vec<Uuid>,
    pub date_range: Option<DateRange>,
    pub persona: Option<PersonaConfig>,
}

impl QueryOptions {
    /// Merge with default search options.
    pub fn search_options(&self, defaults: &SearchOptions) -> SearchOptions {
        SearchOptions {
            threshold: self.threshold.unwrap_or(defaults.threshold),
            match_count: self.match_count.unwrap_or(defaults.match_count),
            content_types: if self.content_types.is_empty() {
                defaults.content_types.clone()
            } else {
                self.content_types.clone()
            },
            content_ids: if self.content_ids.is_empty() {
                defaults.content_ids.clone()
            } else {
                self.content_ids.clone()
            },
            date_range: self.date_range.or(defaults.date_range),
        }
    }
}

/// A chunk that informed an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReference {
    pub chunk_id: Uuid,
    pub content_id: Uuid,
    pub source_type: SourceType,
    pub label: String,
    pub url: Option<String>,
    pub similarity: f32,
    pub text: String,
}

impl From<&RankedChunk> for SourceReference {
    fn from(ranked: &RankedChunk) -> Self {
        Self {
            chunk_id: ranked.chunk.id,
            content_id: ranked.source.id,
            source_type: ranked.source.source_type,
            label: ranked.source.label.clone(),
            url: ranked.source.url.clone(),
            similarity: ranked.similarity,
            text: ranked.chunk.text.clone(),
        }
    }
}

/// The avatar's answer with its supporting chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
    pub sources: Vec<SourceReference>,
    /// False when no stored content informed the answer.
    pub has_results: bool,
}

impl QueryResponse {
    /// Format the response for display.
    pub fn format_for_display(&self) -> String {
        let mut output = self.response.clone();

        if !self.sources.is_empty() {
            output.push_str("\n\n--- Sources ---\n");
            for source in &self.sources {
                output.push_str(&format!(
                    "\n{} [{}] (similarity: {:.2})",
                    source.label, source.source_type, source.similarity
                ));
                if let Some(url) = &source.url {
                    output.push_str(&format!("\n  {}", url));
                }
            }
        }

        output
    }
}

/// RAG engine for answering audience messages.
pub struct RagEngine {
    embeddings: Arc<EmbeddingGenerator>,
    store: Arc<dyn VectorStore>,
    assembler: ContextAssembler,
    responder: ResponseGenerator,
    persona: PersonaConfig,
    defaults: SearchOptions,
    record_history: bool,
}

impl RagEngine {
    pub fn new(
        embeddings: Arc<EmbeddingGenerator>,
        store: Arc<dyn VectorStore>,
        assembler: ContextAssembler,
        responder: ResponseGenerator,
    ) -> Self {
        Self {
            embeddings,
            store,
            assembler,
            responder,
            persona: PersonaConfig::default(),
            defaults: SearchOptions::default(),
            record_history: true,
        }
    }

    /// Set the persona used when a query does not supply one.
    pub fn with_persona(mut self, persona: PersonaConfig) -> Self {
        self.persona = persona;
        self
    }

    /// Set the default search options.
    pub fn with_search_defaults(mut self, defaults: SearchOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Enable or disable query history recording.
    pub fn with_history(mut self, record_history: bool) -> Self {
        self.record_history = record_history;
        self
    }

    pub fn responder(&self) -> &ResponseGenerator {
        &self.responder
    }

    /// Retrieve the owner's most relevant chunks without generating an answer.
    #[instrument(skip(self, options))]
    pub async fn search(&self, query: &str, owner_id: &str, options: &SearchOptions) -> Result<Vec<RankedChunk>> {
        let embedding = self.embed_query(query).await?;
        self.store.search(&embedding, owner_id, options).await
    }

    /// Answer a message as the owner's avatar.
    #[instrument(skip(self, message, options))]
    pub async fn query(&self, message: &str, owner_id: &str, options: &QueryOptions) -> Result<QueryResponse> {
        let embedding = self.embed_query(message).await?;

        let search = options.search_options(&self.defaults);
        let ranked = self.store.search(&embedding, owner_id, &search).await?;
        let context = self.assembler.assemble(&ranked);
        info!(
            "Retrieved {} chunks, {} in context (~{} tokens)",
            ranked.len(),
            context.included_chunk_ids.len(),
            context.estimated_tokens
        );

        let persona = options.persona.as_ref().unwrap_or(&self.persona);
        let response = self.responder.generate(message, &context, persona).await?;

        if self.record_history {
            let record = QueryRecord::new(
                owner_id,
                message,
                embedding,
                response.clone(),
                context.included_chunk_ids.clone(),
            );
            if let Err(e) = self.store.record_history(&record).await {
                warn!("Failed to record query history: {}", e);
            }
        }

        let sources = ranked
            .iter()
            .filter(|r| context.included_chunk_ids.contains(&r.chunk.id))
            .map(SourceReference::from)
            .collect();

        Ok(QueryResponse {
            response,
            sources,
            has_results: !context.is_empty(),
        })
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        if query.trim().is_empty() {
            return Err(AvatarError::InvalidInput("Query must not be empty".to_string()));
        }
        self.embeddings.embed(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{chunk_text, ChunkingConfig};
    use crate::config::{ContextSettings, GenerationSettings};
    use crate::llm::CompletionParams;
    use crate::test_support::{HashEmbedder, ScriptedChat};
    use crate::vector_store::{ContentSource, MemoryVectorStore};

    struct Fixture {
        engine: RagEngine,
        chat: Arc<ScriptedChat>,
        store: Arc<MemoryVectorStore>,
        embeddings: Arc<EmbeddingGenerator>,
    }

    fn fixture(reply: &str) -> Fixture {
        let embeddings = Arc::new(EmbeddingGenerator::with_limits(Arc::new(HashEmbedder::new(256)), 8000, 100));
        let store = Arc::new(MemoryVectorStore::new());
        let chat = Arc::new(ScriptedChat::replying(reply));
        let responder = ResponseGenerator::new(chat.clone(), CompletionParams::from(&GenerationSettings::default()));
        let engine = RagEngine::new(
            embeddings.clone(),
            store.clone(),
            ContextAssembler::new(&ContextSettings::default()),
            responder,
        )
        .with_search_defaults(SearchOptions {
            threshold: 0.2,
            ..SearchOptions::default()
        });

        Fixture {
            engine,
            chat,
            store,
            embeddings,
        }
    }

    async fn ingest(f: &Fixture, owner: &str, label: &str, text: &str) -> ContentSource {
        let source = ContentSource::new(owner, SourceType::CustomText, format!("custom-{}", label), label);
        f.store.store_source(&source).await.unwrap();
        let chunks = chunk_text(text, &ChunkingConfig::default());
        let embedded = f.embeddings.embed_chunks(chunks).await.unwrap();
        f.store.store_chunks(&source, &embedded).await.unwrap();
        source
    }

    #[tokio::test]
    async fn test_query_against_empty_store() {
        let f = fixture("I don't have enough information to answer that.");

        let response = f.engine.query("What is your favourite food?", "owner", &QueryOptions::default()).await.unwrap();
        assert!(!response.has_results);
        assert!(response.sources.is_empty());
        assert_eq!(response.response, "I don't have enough information to answer that.");

        let calls = f.chat.calls();
        assert!(calls[0].0[1].content.contains("No relevant excerpts"));

        let history = f.store.list_history("owner", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].has_context);
    }

    #[tokio::test]
    async fn test_query_uses_owner_content_only() {
        let f = fixture("I run trails every morning.");
        let mine = ingest(&f, "maya", "Running", "I run mountain trails every morning before sunrise.").await;
        ingest(&f, "someone-else", "Running copy", "I run mountain trails every morning before sunrise.").await;

        let response = f.engine.query("do you run mountain trails", "maya", &QueryOptions::default()).await.unwrap();
        assert!(response.has_results);
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].content_id, mine.id);

        let context_message = &f.chat.calls()[0].0[1].content;
        assert!(context_message.contains("[1] Running"));

        let history = f.store.list_history("maya", 10).await.unwrap();
        assert_eq!(history[0].retrieved_chunk_ids, vec![response.sources[0].chunk_id]);
        assert!(f.store.list_history("someone-else", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_lists_only_chunks_in_context() {
        let f = fixture("Mornings, mostly.");
        ingest(&f, "maya", "Mornings", "I run mountain trails every morning before sunrise.").await;
        ingest(&f, "maya", "Evenings", "I run mountain trails every evening after work too.").await;
        let engine = RagEngine::new(
            f.embeddings.clone(),
            f.store.clone(),
            ContextAssembler::new(&ContextSettings::default()).with_max_tokens(25),
            ResponseGenerator::new(f.chat.clone(), CompletionParams::from(&GenerationSettings::default())),
        )
        .with_search_defaults(SearchOptions {
            threshold: 0.2,
            ..SearchOptions::default()
        });

        let question = "do you run mountain trails every morning";
        let search = SearchOptions {
            threshold: 0.2,
            ..SearchOptions::default()
        };
        let ranked = engine.search(question, "maya", &search).await.unwrap();
        assert_eq!(ranked.len(), 2);

        let response = engine.query(question, "maya", &QueryOptions::default()).await.unwrap();
        assert_eq!(response.sources.len(), 1);

        let history = f.store.list_history("maya", 10).await.unwrap();
        assert_eq!(history[0].retrieved_chunk_ids, vec![response.sources[0].chunk_id]);
    }

    #[tokio::test]
    async fn test_query_persona_override_and_no_history() {
        let f = fixture("Hi!");
        let engine = f.engine.with_history(false);
        let options = QueryOptions {
            persona: Some(PersonaConfig {
                name: "Coach Kim".to_string(),
                ..PersonaConfig::default()
            }),
            ..QueryOptions::default()
        };

        engine.query("hello", "owner", &options).await.unwrap();
        assert!(f.chat.calls()[0].0[0].content.contains("You are Coach Kim"));
        assert!(f.store.list_history("owner", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let f = fixture("unused");
        let result = f.engine.query("   ", "owner", &QueryOptions::default()).await;
        assert!(matches!(result, Err(AvatarError::InvalidInput(_))));
        assert!(f.chat.calls().is_empty());
    }

    #[test]
    fn test_query_options_merge() {
        let defaults = SearchOptions {
            threshold: 0.5,
            match_count: 7,
            ..SearchOptions::default()
        };
        let options = QueryOptions {
            match_count: Some(2),
            content_types: vec![SourceType::InstagramPost],
            ..QueryOptions::default()
        };

        let merged = options.search_options(&defaults);
        assert_eq!(merged.threshold, 0.5);
        assert_eq!(merged.match_count, 2);
        assert_eq!(merged.content_types, vec![SourceType::InstagramPost]);
    }
}
