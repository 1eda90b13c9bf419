//! OpenAI client construction and error classification.

use crate::config::OpenAISettings;
use crate::error::{AvatarError, ProviderErrorKind, Result};
use async_openai::{config::OpenAIConfig, error::OpenAIError, Client};
use reqwest::StatusCode;
use std::time::Duration;

/// Create an OpenAI client from explicit settings.
///
/// Fails with [`AvatarError::NotConfigured`] when no API key is available, so a
/// missing credential is reported before any request is attempted.
pub fn create_client(settings: &OpenAISettings) -> Result<Client<OpenAIConfig>> {
    let api_key = settings.resolve_api_key().ok_or_else(|| {
        AvatarError::NotConfigured(
            "OpenAI API key (set openai.api_key or OPENAI_API_KEY)".to_string(),
        )
    })?;

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout_seconds))
        .build()?;

    let mut config = OpenAIConfig::new().with_api_key(api_key);
    if let Some(base) = settings.api_base.as_deref().filter(|b| !b.is_empty()) {
        config = config.with_api_base(base);
    }

    Ok(Client::with_config(config).with_http_client(http_client))
}

/// Map an async-openai error onto a provider error kind.
pub fn classify_error(err: &OpenAIError) -> ProviderErrorKind {
    match err {
        OpenAIError::Reqwest(e) => match e.status() {
            Some(status) => classify_status(status),
            None => ProviderErrorKind::Network,
        },
        OpenAIError::ApiError(api) => classify_api_error(api.r#type.as_deref(), &api.message),
        OpenAIError::InvalidArgument(_) => ProviderErrorKind::InvalidRequest,
        _ => ProviderErrorKind::Other,
    }
}

fn classify_status(status: StatusCode) -> ProviderErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderErrorKind::Auth,
        StatusCode::TOO_MANY_REQUESTS => ProviderErrorKind::RateLimit,
        s if s.is_server_error() => ProviderErrorKind::Network,
        s if s.is_client_error() => ProviderErrorKind::InvalidRequest,
        _ => ProviderErrorKind::Other,
    }
}

/// Classify an API error body by its `type` field and message.
fn classify_api_error(error_type: Option<&str>, message: &str) -> ProviderErrorKind {
    let error_type = error_type.unwrap_or_default().to_lowercase();
    let message = message.to_lowercase();

    if error_type.contains("insufficient_quota")
        || error_type.contains("rate_limit")
        || message.contains("rate limit")
        || message.contains("quota")
    {
        ProviderErrorKind::RateLimit
    } else if error_type.contains("authentication")
        || error_type.contains("permission")
        || message.contains("api key")
    {
        ProviderErrorKind::Auth
    } else if error_type.contains("invalid_request") {
        ProviderErrorKind::InvalidRequest
    } else if error_type.contains("server_error") || message.contains("overloaded") {
        ProviderErrorKind::Network
    } else {
        ProviderErrorKind::Other
    }
}
