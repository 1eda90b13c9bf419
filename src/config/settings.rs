//! Configuration settings for the avatar pipeline.

use crate::error::{AvatarError, Result};
use crate::rag::PersonaConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub openai: OpenAISettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub vector_store: VectorStoreSettings,
    pub retrieval: RetrievalSettings,
    pub context: ContextSettings,
    pub generation: GenerationSettings,
    pub persona: PersonaConfig,
    pub youtube: YoutubeSettings,
    pub instagram: InstagramSettings,
    pub ingest: IngestSettings,
    pub prompts: PromptSettings,
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level used when no `-v` flag is given (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.avatar-rag".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// OpenAI credentials and transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAISettings {
    /// API key. Falls back to the environment variable named by `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset.
    pub api_key_env: String,
    /// Alternative API base URL (OpenAI-compatible endpoints).
    pub api_base: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for OpenAISettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_base: None,
            timeout_seconds: 120,
        }
    }
}

impl OpenAISettings {
    /// The configured key, or the environment fallback. Empty values count as missing.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                std::env::var(&self.api_key_env)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding provider (openai).
    pub provider: String,
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
    /// Local guard: inputs estimated above this many tokens are rejected.
    pub max_input_tokens: usize,
    /// Maximum number of texts per provider call.
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            max_input_tokens: 8000,
            batch_size: 100,
        }
    }
}

/// Content chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Maximum chunk length in bytes.
    pub chunk_size: usize,
    /// Overlap carried from one chunk into the next.
    pub overlap: usize,
    /// Cleaned sources shorter than this (in characters) are rejected.
    pub min_content_chars: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            overlap: 150,
            min_content_chars: 100,
        }
    }
}

/// Vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    /// Vector store provider (sqlite, memory).
    pub provider: String,
    /// Path to SQLite database (for sqlite provider).
    pub sqlite_path: Option<String>,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            sqlite_path: Some("~/.avatar-rag/vectors.db".to_string()),
        }
    }
}

/// Similarity search defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Minimum cosine similarity a chunk must exceed.
    pub threshold: f32,
    /// Maximum number of chunks returned.
    pub match_count: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            match_count: 5,
        }
    }
}

/// Prompt context assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Token budget for the assembled context.
    pub max_tokens: usize,
    /// Prefix each excerpt with its source label.
    pub include_source_labels: bool,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_tokens: 4000,
            include_source_labels: true,
        }
    }
}

/// LLM completion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Chat model used for answers and summaries.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum completion tokens.
    pub max_tokens: u32,
    /// Nucleus sampling, left to the provider default when unset.
    pub top_p: Option<f32>,
    /// Append a history record after every answered query.
    pub record_history: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 500,
            top_p: None,
            record_history: true,
        }
    }
}

/// YouTube-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeSettings {
    /// Subtitle language selector passed to yt-dlp.
    pub subtitle_languages: String,
    /// Default number of videos pulled from a channel.
    pub max_items: usize,
}

impl Default for YoutubeSettings {
    fn default() -> Self {
        Self {
            subtitle_languages: "en.*".to_string(),
            max_items: 25,
        }
    }
}

/// Instagram Graph API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstagramSettings {
    /// Long-lived access token. Falls back to `INSTAGRAM_ACCESS_TOKEN`.
    pub access_token: Option<String>,
    /// Graph API base URL.
    pub base_url: String,
    /// Graph API version segment.
    pub api_version: String,
    /// Default number of posts pulled from an account.
    pub max_items: usize,
}

impl Default for InstagramSettings {
    fn default() -> Self {
        Self {
            access_token: None,
            base_url: "https://graph.facebook.com".to_string(),
            api_version: "v19.0".to_string(),
            max_items: 25,
        }
    }
}

impl InstagramSettings {
    /// The configured token, or the environment fallback.
    pub fn resolve_access_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| {
                std::env::var("INSTAGRAM_ACCESS_TOKEN")
                    .ok()
                    .filter(|t| !t.trim().is_empty())
            })
    }
}

/// Ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Maximum ingestions running at once in a batch.
    pub concurrency: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self { concurrency: 2 }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Settings>(&content)?
        } else {
            Settings::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject inconsistent values once, at load time.
    pub fn validate(&self) -> Result<()> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(AvatarError::Config("chunking.chunk_size must be positive".to_string()));
        }
        if chunking.overlap >= chunking.chunk_size {
            return Err(AvatarError::Config(format!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                chunking.overlap, chunking.chunk_size
            )));
        }
        if self.embedding.dimensions == 0 {
            return Err(AvatarError::Config("embedding.dimensions must be positive".to_string()));
        }
        if self.embedding.batch_size == 0 {
            return Err(AvatarError::Config("embedding.batch_size must be positive".to_string()));
        }
        if !(-1.0..=1.0).contains(&self.retrieval.threshold) {
            return Err(AvatarError::Config(format!(
                "retrieval.threshold ({}) must be within [-1, 1]",
                self.retrieval.threshold
            )));
        }
        if self.retrieval.match_count == 0 {
            return Err(AvatarError::Config("retrieval.match_count must be positive".to_string()));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(AvatarError::Config(format!(
                "generation.temperature ({}) must be within [0, 2]",
                self.generation.temperature
            )));
        }
        if let Some(top_p) = self.generation.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return Err(AvatarError::Config(format!(
                    "generation.top_p ({}) must be within [0, 1]",
                    top_p
                )));
            }
        }
        if self.ingest.concurrency == 0 {
            return Err(AvatarError::Config("ingest.concurrency must be positive".to_string()));
        }
        if !LOG_LEVELS.contains(&self.general.log_level.as_str()) {
            return Err(AvatarError::Config(format!(
                "general.log_level ({}) must be one of {}",
                self.general.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AvatarError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("avatar-rag")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path, if one is configured.
    pub fn sqlite_path(&self) -> Option<PathBuf> {
        self.vector_store
            .sqlite_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(Self::expand_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.chunking.chunk_size, 1500);
        assert_eq!(settings.chunking.overlap, 150);
        assert_eq!(settings.embedding.max_input_tokens, 8000);
        assert_eq!(settings.context.max_tokens, 4000);
        assert!((settings.retrieval.threshold - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [retrieval]
            match_count = 8

            [persona]
            name = "Maya"
            "#,
        )
        .unwrap();

        assert_eq!(settings.retrieval.match_count, 8);
        assert!((settings.retrieval.threshold - 0.75).abs() < f32::EPSILON);
        assert_eq!(settings.persona.name, "Maya");
        assert_eq!(settings.embedding.model, "text-embedding-3-small");
    }

    #[test]
    fn test_validate_rejects_overlap_not_smaller_than_chunk() {
        let mut settings = Settings::default();
        settings.chunking.overlap = settings.chunking.chunk_size;
        assert!(matches!(settings.validate(), Err(AvatarError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let mut settings = Settings::default();
        settings.general.log_level = "loud".to_string();
        assert!(matches!(settings.validate(), Err(AvatarError::Config(_))));

        settings.general.log_level = "debug".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.generation.model = "gpt-4.1-mini".to_string();
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.generation.model, "gpt-4.1-mini");
    }

    #[test]
    fn test_empty_sqlite_path_is_none() {
        let mut settings = Settings::default();
        settings.vector_store.sqlite_path = Some("  ".to_string());
        assert!(settings.sqlite_path().is_none());
    }
}
