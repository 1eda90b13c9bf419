//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools and credentials are available before
//! starting operations that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{AvatarError, Result};
use crate::sources::SourceType;
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Ingestion needs embeddings plus whatever the source type fetches with.
    Ingest(SourceType),
    /// Queries need embeddings and completions.
    Ask,
    /// Search needs query embeddings.
    Search,
    /// Listing and deleting touch only the local store.
    Manage,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Ingest(source_type) => {
            check_api_key(settings)?;
            match source_type {
                SourceType::YoutubeVideo | SourceType::YoutubeChannel => check_tool("yt-dlp")?,
                SourceType::InstagramPost | SourceType::InstagramAccount => check_instagram_token(settings)?,
                SourceType::CustomText => {}
            }
        }
        Operation::Ask | Operation::Search => check_api_key(settings)?,
        Operation::Manage => {}
    }
    Ok(())
}

fn check_api_key(settings: &Settings) -> Result<()> {
    match settings.openai.resolve_api_key() {
        Some(_) => Ok(()),
        None => Err(AvatarError::Config(format!(
            "{} not set. Set it with: export {}='sk-...' or add openai.api_key to the config",
            settings.openai.api_key_env, settings.openai.api_key_env
        ))),
    }
}

fn check_instagram_token(settings: &Settings) -> Result<()> {
    match settings.instagram.resolve_access_token() {
        Some(_) => Ok(()),
        None => Err(AvatarError::NotConfigured(
            "Instagram (set INSTAGRAM_ACCESS_TOKEN or instagram.access_token)".to_string(),
        )),
    }
}

/// Check if an external tool is available.
fn check_tool(name: &str) -> Result<()> {
    match Command::new(name).arg("--version").output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(AvatarError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AvatarError::ToolNotFound(name.to_string())),
        Err(e) => Err(AvatarError::ToolNotFound(format!("{}: {}", name, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manage_has_no_requirements() {
        assert!(check(Operation::Manage, &Settings::default()).is_ok());
    }

    #[test]
    fn test_configured_key_passes() {
        let mut settings = Settings::default();
        settings.openai.api_key = Some("sk-test".to_string());
        assert!(check(Operation::Ask, &settings).is_ok());
        assert!(check(Operation::Ingest(SourceType::CustomText), &settings).is_ok());
    }

    #[test]
    fn test_missing_key_fails() {
        let mut settings = Settings::default();
        settings.openai.api_key_env = "AVATAR_TEST_UNSET_KEY".to_string();
        let err = check(Operation::Search, &settings).unwrap_err();
        assert!(err.to_string().contains("AVATAR_TEST_UNSET_KEY"));
    }

    #[test]
    fn test_instagram_requires_token() {
        if std::env::var("INSTAGRAM_ACCESS_TOKEN").is_ok() {
            return;
        }
        let mut settings = Settings::default();
        settings.openai.api_key = Some("sk-test".to_string());
        let err = check(Operation::Ingest(SourceType::InstagramPost), &settings).unwrap_err();
        assert!(matches!(err, AvatarError::NotConfigured(_)));
    }
}
