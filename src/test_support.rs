//! Deterministic fakes for provider traits.

use crate::embedding::Embedder;
use crate::error::{AvatarError, ProviderErrorKind, Result};
use crate::llm::{ChatMessage, ChatModel, CompletionParams};
use crate::sources::{ContentFetcher, SourceMetadata, SourceType};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Bag-of-words embedder: each lowercase word adds 1 to a hashed bucket.
///
/// Texts sharing words get positive similarity, which is enough to exercise
/// ranking and thresholds.
pub(crate) struct HashEmbedder {
    dimensions: usize,
    reported_dimensions: usize,
    failure: Option<ProviderErrorKind>,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub(crate) fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            reported_dimensions: dimensions,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// An embedder whose every call fails with `kind`.
    pub(crate) fn failing(dimensions: usize, kind: ProviderErrorKind) -> Self {
        Self {
            failure: Some(kind),
            ..Self::new(dimensions)
        }
    }

    /// Claim a different dimension count than the vectors actually have.
    pub(crate) fn reporting_dimensions(mut self, dimensions: usize) -> Self {
        self.reported_dimensions = dimensions;
        self
    }

    /// Number of `embed_batch` calls so far.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            vector[(hasher.finish() % self.dimensions as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.failure {
            return Err(AvatarError::EmbeddingProvider {
                kind,
                message: "scripted failure".to_string(),
            });
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.reported_dimensions
    }

    fn model(&self) -> &str {
        "hash-bag-of-words"
    }
}

/// Chat model that returns a fixed reply and records every request.
pub(crate) struct ScriptedChat {
    reply: std::result::Result<String, ProviderErrorKind>,
    calls: Mutex<Vec<(Vec<ChatMessage>, CompletionParams)>>,
}

impl ScriptedChat {
    pub(crate) fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(kind: ProviderErrorKind) -> Self {
        Self {
            reply: Err(kind),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<(Vec<ChatMessage>, CompletionParams)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, messages: &[ChatMessage], params: &CompletionParams) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), params.clone()));
        self.reply.clone().map_err(|kind| AvatarError::LlmProvider {
            kind,
            message: "scripted failure".to_string(),
        })
    }
}

/// Fetcher serving canned texts and collections.
pub(crate) struct StaticFetcher {
    types: Vec<SourceType>,
    texts: HashMap<String, String>,
    collections: HashMap<String, Vec<String>>,
}

impl StaticFetcher {
    pub(crate) fn new(source_type: SourceType) -> Self {
        Self {
            types: vec![source_type],
            texts: HashMap::new(),
            collections: HashMap::new(),
        }
    }

    /// Also serve another source type.
    pub(crate) fn also(mut self, source_type: SourceType) -> Self {
        self.types.push(source_type);
        self
    }

    pub(crate) fn with_text(mut self, id: &str, text: &str) -> Self {
        self.texts.insert(id.to_string(), text.to_string());
        self
    }

    pub(crate) fn with_collection(mut self, id: &str, items: &[&str]) -> Self {
        self.collections
            .insert(id.to_string(), items.iter().map(|s| s.to_string()).collect());
        self
    }

    fn known(&self, id: &str) -> Result<()> {
        if self.texts.contains_key(id) || self.collections.contains_key(id) {
            Ok(())
        } else {
            Err(AvatarError::ContentNotFound(id.to_string()))
        }
    }
}

#[async_trait]
impl ContentFetcher for StaticFetcher {
    fn supports(&self, source_type: SourceType) -> bool {
        self.types.contains(&source_type)
    }

    async fn get_text(&self, _source_type: SourceType, source_id: &str) -> Result<String> {
        self.texts
            .get(source_id)
            .cloned()
            .ok_or_else(|| AvatarError::ContentNotFound(source_id.to_string()))
    }

    async fn get_metadata(&self, _source_type: SourceType, source_id: &str) -> Result<SourceMetadata> {
        self.known(source_id)?;
        Ok(SourceMetadata {
            title: format!("Title of {}", source_id),
            url: Some(format!("https://example.com/{}", source_id)),
            ..SourceMetadata::default()
        })
    }

    async fn list_items(&self, _source_type: SourceType, source_id: &str, limit: usize) -> Result<Vec<String>> {
        self.collections
            .get(source_id)
            .map(|items| items.iter().take(limit).cloned().collect())
            .ok_or_else(|| AvatarError::ContentNotFound(source_id.to_string()))
    }
}
