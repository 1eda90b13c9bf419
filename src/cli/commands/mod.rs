//! CLI command implementations.

mod ask;
mod config;
mod history;
mod ingest;
mod list;
mod search;
mod serve;
mod summarize;

pub use ask::run_ask;
pub use config::run_config;
pub use history::run_history;
pub use ingest::{run_ingest, run_ingest_collection};
pub use list::{run_delete, run_list};
pub use search::run_search;
pub use serve::{router, run_serve};
pub use summarize::run_summarize;

/// The owner ID from `--owner` / `AVATAR_OWNER_ID`.
pub fn require_owner(owner: Option<&str>) -> anyhow::Result<&str> {
    owner
        .filter(|o| !o.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("No owner given. Pass --owner <id> or set AVATAR_OWNER_ID."))
}
