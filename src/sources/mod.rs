//! Content source abstraction.
//!
//! Fetchers turn a provider identifier (video ID, channel handle, media ID,
//! account ID) into raw text and metadata for ingestion.

mod instagram;
mod youtube;

pub use instagram::InstagramFetcher;
pub use youtube::{channel_url, extract_video_id, parse_vtt, YoutubeFetcher};

use crate::config::Settings;
use crate::error::{AvatarError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Kind of ingested origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    YoutubeVideo,
    YoutubeChannel,
    InstagramPost,
    InstagramAccount,
    CustomText,
}

impl SourceType {
    pub const ALL: [SourceType; 5] = [
        SourceType::YoutubeVideo,
        SourceType::YoutubeChannel,
        SourceType::InstagramPost,
        SourceType::InstagramAccount,
        SourceType::CustomText,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::YoutubeVideo => "youtube_video",
            SourceType::YoutubeChannel => "youtube_channel",
            SourceType::InstagramPost => "instagram_post",
            SourceType::InstagramAccount => "instagram_account",
            SourceType::CustomText => "custom_text",
        }
    }

    /// Whether raw text from this source is a spoken transcript.
    pub fn is_transcript(&self) -> bool {
        matches!(self, SourceType::YoutubeVideo)
    }

    /// The item type contained in a collection source (channel → video, account → post).
    pub fn item_type(&self) -> Option<SourceType> {
        match self {
            SourceType::YoutubeChannel => Some(SourceType::YoutubeVideo),
            SourceType::InstagramAccount => Some(SourceType::InstagramPost),
            _ => None,
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        SourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("Unknown source type: {}", s))
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider metadata about a source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Human-readable title (video title, account name, post permalink).
    pub title: String,
    /// Canonical URL, if known.
    pub url: Option<String>,
    /// Publication time, if known.
    pub published_at: Option<DateTime<Utc>>,
    /// Provider-specific extras (counts, keywords, channel names).
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Trait for content fetchers.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Whether this fetcher handles the given source type.
    fn supports(&self, source_type: SourceType) -> bool;

    /// Transcript or text body of a source.
    async fn get_text(&self, source_type: SourceType, source_id: &str) -> Result<String>;

    /// Metadata for a source.
    async fn get_metadata(&self, source_type: SourceType, source_id: &str) -> Result<SourceMetadata>;

    /// Item IDs inside a collection source (videos of a channel, posts of an account).
    async fn list_items(&self, source_type: SourceType, source_id: &str, limit: usize) -> Result<Vec<String>>;
}

/// Lookup of fetchers by source type.
#[derive(Clone, Default)]
pub struct FetcherRegistry {
    fetchers: Vec<Arc<dyn ContentFetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the fetchers available under the given settings.
    ///
    /// Instagram is only registered when an access token is configured.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(YoutubeFetcher::new(&settings.youtube)));

        match InstagramFetcher::new(&settings.instagram, settings.openai.timeout_seconds) {
            Ok(fetcher) => registry.register(Arc::new(fetcher)),
            Err(AvatarError::NotConfigured(what)) => debug!("Instagram fetcher disabled: {} missing", what),
            Err(e) => return Err(e),
        }

        Ok(registry)
    }

    pub fn register(&mut self, fetcher: Arc<dyn ContentFetcher>) {
        self.fetchers.push(fetcher);
    }

    /// The fetcher responsible for a source type.
    pub fn for_type(&self, source_type: SourceType) -> Result<Arc<dyn ContentFetcher>> {
        self.fetchers
            .iter()
            .find(|f| f.supports(source_type))
            .cloned()
            .ok_or_else(|| AvatarError::NotConfigured(format!("Content fetcher for {}", source_type)))
    }
}
