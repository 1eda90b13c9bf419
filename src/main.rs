//! Avatar CLI entry point.

use anyhow::Result;
use avatar_rag::cli::{commands, Cli, Commands};
use avatar_rag::config::Settings;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.as_ref().map(std::path::PathBuf::from);
    let settings = Settings::load_from(config_path.as_ref())?;
    let log_level = cli.log_level(&settings.general.log_level);

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("avatar_rag={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    std::fs::create_dir_all(settings.data_dir())?;

    let owner = cli.owner.as_deref();

    match &cli.command {
        Commands::Ingest {
            source_type,
            source_id,
            text,
            file,
            label,
        } => {
            commands::run_ingest(
                commands::require_owner(owner)?,
                *source_type,
                source_id.clone(),
                text.clone(),
                file.clone(),
                label.clone(),
                settings,
            )
            .await?;
        }

        Commands::IngestCollection {
            source_type,
            collection_id,
            limit,
        } => {
            commands::run_ingest_collection(
                commands::require_owner(owner)?,
                *source_type,
                collection_id,
                *limit,
                settings,
            )
            .await?;
        }

        Commands::Ask {
            message,
            threshold,
            match_count,
            content_types,
        } => {
            commands::run_ask(
                commands::require_owner(owner)?,
                message,
                *threshold,
                *match_count,
                content_types.clone(),
                settings,
            )
            .await?;
        }

        Commands::Search {
            query,
            threshold,
            match_count,
        } => {
            commands::run_search(commands::require_owner(owner)?, query, *threshold, *match_count, settings)
                .await?;
        }

        Commands::List { content_id } => {
            commands::run_list(commands::require_owner(owner)?, *content_id, settings).await?;
        }

        Commands::Delete { content_id } => {
            commands::run_delete(commands::require_owner(owner)?, *content_id, settings).await?;
        }

        Commands::History { limit } => {
            commands::run_history(commands::require_owner(owner)?, *limit, settings).await?;
        }

        Commands::Summarize { file, max_length } => {
            commands::run_summarize(file.clone(), *max_length, settings).await?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host, *port, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, config_path, settings)?;
        }
    }

    Ok(())
}
