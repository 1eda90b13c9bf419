//! Summarize command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use tokio::io::AsyncReadExt;

/// Run the summarize command.
pub async fn run_summarize(file: Option<String>, max_length: usize, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&e.to_string());
        return Err(e.into());
    }

    let text = match file {
        Some(path) => tokio::fs::read_to_string(&path).await?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };

    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner("Summarizing...");
    let summary = orchestrator.summarize(&text, max_length).await;
    spinner.finish_and_clear();

    println!("{}", summary?);
    Ok(())
}
