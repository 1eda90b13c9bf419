//! CLI module for the avatar.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use crate::sources::SourceType;
use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Avatar RAG - answer audience messages in a creator's voice
///
/// Ingests YouTube transcripts, Instagram captions, and custom text into an
/// owner-scoped knowledge base, then answers questions grounded in it.
#[derive(Parser, Debug)]
#[command(name = "avatar")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Owner (creator) whose content is read or written
    #[arg(short, long, global = true, env = "AVATAR_OWNER_ID")]
    pub owner: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log level from the `-v` count, or `configured` when none is given.
    pub fn log_level(&self, configured: &str) -> String {
        match self.verbose {
            0 => configured.to_string(),
            1 => "info".to_string(),
            2 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest one source into the owner's knowledge base
    Ingest {
        /// Source type (youtube_video, youtube_channel, instagram_post, instagram_account, custom_text)
        #[arg(short = 't', long = "type", default_value = "youtube_video")]
        source_type: SourceType,

        /// Video URL/ID, post ID, or account ID
        source_id: Option<String>,

        /// Inline text to ingest (custom_text)
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,

        /// Read text to ingest from a file (custom_text)
        #[arg(short, long)]
        file: Option<String>,

        /// Label shown when this source is cited
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Ingest every video of a channel or post of an account
    IngestCollection {
        /// Collection type (youtube_channel, instagram_account)
        #[arg(short = 't', long = "type", default_value = "youtube_channel")]
        source_type: SourceType,

        /// Channel handle/ID/URL, or Instagram account ID
        collection_id: String,

        /// Maximum number of items (default: from config)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Ask the avatar a question
    Ask {
        /// The audience message
        message: String,

        /// Minimum similarity for retrieved chunks
        #[arg(long)]
        threshold: Option<f32>,

        /// Maximum number of retrieved chunks
        #[arg(short = 'n', long)]
        match_count: Option<usize>,

        /// Restrict retrieval to these source types
        #[arg(long = "content-type")]
        content_types: Vec<SourceType>,
    },

    /// Search the owner's content without generating an answer
    Search {
        /// Search query
        query: String,

        /// Minimum similarity score
        #[arg(long)]
        threshold: Option<f32>,

        /// Maximum number of results
        #[arg(short = 'n', long)]
        match_count: Option<usize>,
    },

    /// List ingested sources, or the chunks of one source
    List {
        /// Show the chunks of this content ID
        content_id: Option<Uuid>,
    },

    /// Delete a source and its chunks
    Delete {
        /// Content ID to delete
        content_id: Uuid,
    },

    /// Show recent questions and answers
    History {
        /// Number of entries
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Summarize a text file (stdin if not specified)
    Summarize {
        /// Input file
        file: Option<String>,

        /// Target summary length in characters
        #[arg(short, long, default_value = "200")]
        max_length: usize,
    },

    /// Start HTTP API server for integration with other systems
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
