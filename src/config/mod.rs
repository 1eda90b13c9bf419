//! Configuration module.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{PersonaPrompts, Prompts, SummaryPrompts};
pub use settings::{
    ChunkingSettings, ContextSettings, EmbeddingSettings, GeneralSettings, GenerationSettings,
    IngestSettings, InstagramSettings, OpenAISettings, PromptSettings, RetrievalSettings,
    Settings, VectorStoreSettings, YoutubeSettings,
};
