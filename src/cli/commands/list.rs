//! List and delete command implementations.

use crate::cli::Output;
use crate::config::Settings;
use crate::vector_store::open_vector_store;
use anyhow::Result;
use uuid::Uuid;

/// Run the list command.
///
/// Only the local store is opened, so no API key is needed.
pub async fn run_list(owner_id: &str, content_id: Option<Uuid>, settings: Settings) -> Result<()> {
    let store = open_vector_store(&settings)?;

    if let Some(content_id) = content_id {
        let Some(source) = store.get_source(content_id, owner_id).await? else {
            anyhow::bail!("Content not found: {}", content_id);
        };
        let chunks = store.get_chunks(content_id, owner_id).await?;

        Output::header(&source.label);
        Output::kv("Type", source.source_type.as_str());
        Output::kv("Source ID", &source.source_id);
        if let Some(url) = &source.url {
            Output::kv("URL", url);
        }
        Output::kv("Chunks", &chunks.len().to_string());
        for chunk in &chunks {
            Output::chunk_info(chunk);
        }
        return Ok(());
    }

    let sources = store.list_sources(owner_id).await?;
    if sources.is_empty() {
        Output::info("No content ingested yet. Use 'avatar ingest' to add some.");
        return Ok(());
    }

    Output::header(&format!("Ingested Sources ({})", sources.len()));
    println!();
    for summary in &sources {
        Output::source_info(summary);
    }

    let total_chunks: usize = sources.iter().map(|s| s.chunk_count).sum();
    println!();
    Output::kv("Total sources", &sources.len().to_string());
    Output::kv("Total chunks", &total_chunks.to_string());

    Ok(())
}

/// Run the delete command.
pub async fn run_delete(owner_id: &str, content_id: Uuid, settings: Settings) -> Result<()> {
    let store = open_vector_store(&settings)?;

    if store.delete_source(content_id, owner_id).await? {
        Output::success(&format!("Deleted {} and its chunks", content_id));
        Ok(())
    } else {
        Output::warning(&format!("No content {} for owner {}", content_id, owner_id));
        anyhow::bail!("Content not found: {}", content_id)
    }
}
