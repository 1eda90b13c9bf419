//! History command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::vector_store::open_vector_store;
use anyhow::Result;

/// Run the history command.
pub async fn run_history(owner_id: &str, limit: usize, settings: Settings) -> Result<()> {
    let store = open_vector_store(&settings)?;
    let records = store.list_history(owner_id, limit).await?;

    if records.is_empty() {
        Output::info("No questions asked yet.");
        return Ok(());
    }

    Output::header(&format!("Recent Questions ({})", records.len()));
    for record in &records {
        Output::history_entry(record);
    }

    Ok(())
}
