//! CLI output formatting utilities.

use crate::orchestrator::IngestResult;
use crate::vector_store::{QueryRecord, RankedChunk, SourceSummary, StoredChunk};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print an ingested source.
    pub fn source_info(summary: &SourceSummary) {
        let source = &summary.source;
        println!(
            "  {} {} [{}] ({} chunks, {})",
            style("*").cyan(),
            style(&source.label).bold(),
            source.source_type,
            summary.chunk_count,
            source.effective_date().format("%Y-%m-%d")
        );
        println!("    {}", style(source.id).dim());
        if let Some(url) = &source.url {
            println!("    {}", style(url).dim());
        }
    }

    /// Print one stored chunk of a source.
    pub fn chunk_info(chunk: &StoredChunk) {
        println!(
            "\n{} #{} (bytes {}..{}, ~{} tokens)",
            style(">>").cyan(),
            chunk.chunk_index,
            chunk.start_char,
            chunk.end_char,
            chunk.token_estimate
        );
        println!("   {}", content_preview(&chunk.text, 300));
    }

    /// Print a search hit.
    pub fn search_result(ranked: &RankedChunk) {
        println!(
            "\n{} {} [{}] (similarity: {:.2})",
            style(">>").green(),
            style(&ranked.source.label).bold(),
            ranked.source.source_type,
            ranked.similarity
        );
        println!("   {}", content_preview(&ranked.chunk.text, 200));
        if let Some(url) = &ranked.source.url {
            println!("   {}", style(url).dim());
        }
    }

    /// Print the outcome of one ingestion.
    pub fn ingest_result(result: &IngestResult) {
        let name = result.source_id.as_deref().unwrap_or("source");
        if result.success {
            Self::success(&format!(
                "{}: {} chunks (~{} tokens)",
                name, result.chunks_processed, result.total_tokens
            ));
        } else {
            Self::error(&format!(
                "{}: {}",
                name,
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    /// Print a history entry.
    pub fn history_entry(record: &QueryRecord) {
        let marker = if record.has_context {
            style("*").green()
        } else {
            style("*").yellow()
        };
        println!(
            "\n{} {} {}",
            marker,
            style(record.created_at.format("%Y-%m-%d %H:%M")).dim(),
            style(&record.query_text).bold()
        );
        println!("   {}", content_preview(&record.response_text, 200));
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Single-line preview of at most `max_chars` characters.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    match content.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &content[..end]),
        None => content,
    }
}
