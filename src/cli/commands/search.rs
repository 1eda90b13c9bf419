//! Search command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::rag::QueryOptions;
use anyhow::Result;

/// Run the search command.
pub async fn run_search(
    owner_id: &str,
    query: &str,
    threshold: Option<f32>,
    match_count: Option<usize>,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Search, &settings) {
        Output::error(&e.to_string());
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    let options = QueryOptions {
        threshold,
        match_count,
        ..QueryOptions::default()
    };

    let spinner = Output::spinner("Searching...");
    let results = orchestrator.search(query, owner_id, &options).await;
    spinner.finish_and_clear();

    match results {
        Ok(chunks) if chunks.is_empty() => {
            Output::warning("No results found matching your query.");
        }
        Ok(chunks) => {
            Output::success(&format!("Found {} results", chunks.len()));
            for chunk in &chunks {
                Output::search_result(chunk);
            }
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
