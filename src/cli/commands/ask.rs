//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::rag::QueryOptions;
use crate::sources::SourceType;
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(
    owner_id: &str,
    message: &str,
    threshold: Option<f32>,
    match_count: Option<usize>,
    content_types: Vec<SourceType>,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&e.to_string());
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    let options = QueryOptions {
        threshold,
        match_count,
        content_types,
        ..QueryOptions::default()
    };

    let spinner = Output::spinner("Thinking...");
    let result = orchestrator.query(message, owner_id, &options).await;
    spinner.finish_and_clear();

    match result {
        Ok(response) => {
            if !response.has_results {
                Output::warning("No matching content found; the answer is not grounded in ingested sources.");
            }
            println!("\n{}\n", response.format_for_display());
        }
        Err(e) => {
            Output::error(&format!("Failed to generate answer: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
