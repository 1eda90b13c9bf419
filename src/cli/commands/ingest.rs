//! Ingest command implementations.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{IngestRequest, Orchestrator};
use crate::sources::{extract_video_id, SourceType};
use anyhow::Result;

/// Run the ingest command.
pub async fn run_ingest(
    owner_id: &str,
    source_type: SourceType,
    source_id: Option<String>,
    text: Option<String>,
    file: Option<String>,
    label: Option<String>,
    settings: Settings,
) -> Result<()> {
    if let Some(item_type) = source_type.item_type() {
        anyhow::bail!(
            "{} is a collection of {} items; use 'avatar ingest-collection' instead",
            source_type,
            item_type
        );
    }

    if let Err(e) = preflight::check(Operation::Ingest(source_type), &settings) {
        Output::error(&e.to_string());
        return Err(e.into());
    }

    let text = match (text, file) {
        (Some(text), _) => Some(text),
        (None, Some(path)) => Some(tokio::fs::read_to_string(&path).await?),
        (None, None) => None,
    };

    let source_id = match source_type {
        SourceType::YoutubeVideo => source_id.map(|id| extract_video_id(&id).unwrap_or(id)),
        _ => source_id,
    };

    if source_type == SourceType::CustomText && text.is_none() {
        anyhow::bail!("custom_text needs --text or --file");
    }
    if source_type != SourceType::CustomText && source_id.is_none() {
        anyhow::bail!("{} needs a source ID", source_type);
    }

    let orchestrator = Orchestrator::new(settings)?;
    let request = IngestRequest {
        owner_id: owner_id.to_string(),
        source_type,
        source_id,
        text,
        label,
        metadata: serde_json::Map::new(),
    };

    let spinner = Output::spinner("Fetching, chunking and embedding...");
    let result = orchestrator.ingest(request).await;
    spinner.finish_and_clear();

    Output::ingest_result(&result);
    if let Some(content_id) = result.content_id {
        Output::kv("Content ID", &content_id.to_string());
    }

    if result.success {
        Ok(())
    } else {
        anyhow::bail!("Ingestion failed")
    }
}

/// Run the ingest-collection command.
pub async fn run_ingest_collection(
    owner_id: &str,
    source_type: SourceType,
    collection_id: &str,
    limit: Option<usize>,
    settings: Settings,
) -> Result<()> {
    if source_type.item_type().is_none() {
        anyhow::bail!("{} is not a collection type", source_type);
    }

    if let Err(e) = preflight::check(Operation::Ingest(source_type), &settings) {
        Output::error(&e.to_string());
        return Err(e.into());
    }

    let limit = limit.unwrap_or(match source_type {
        SourceType::InstagramAccount => settings.instagram.max_items,
        _ => settings.youtube.max_items,
    });

    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner(&format!("Ingesting up to {} items from {}...", limit, collection_id));
    let results = orchestrator
        .ingest_collection(source_type, collection_id, owner_id, limit)
        .await;
    spinner.finish_and_clear();

    let results = results?;
    if results.is_empty() {
        Output::warning("The collection has no items.");
        return Ok(());
    }

    Output::header(&format!("Ingested {}", collection_id));
    for result in &results {
        Output::ingest_result(result);
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    let chunks: usize = results.iter().map(|r| r.chunks_processed).sum();
    println!();
    Output::kv("Succeeded", &format!("{}/{}", succeeded, results.len()));
    Output::kv("Chunks stored", &chunks.to_string());

    Ok(())
}
