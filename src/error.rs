//! Error types for the avatar pipeline.

use thiserror::Error;

/// Coarse classification of a failed call to an external provider.
///
/// Lets callers tell quota and credential problems apart from transient
/// network failures when deciding on retry or backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Missing, invalid, or revoked credentials.
    Auth,
    /// Rate limit or exhausted quota.
    RateLimit,
    /// Connection, timeout, or transport failure.
    Network,
    /// The provider rejected the request payload.
    InvalidRequest,
    /// Anything else, including malformed responses.
    Other,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderErrorKind::Auth => write!(f, "auth"),
            ProviderErrorKind::RateLimit => write!(f, "rate limit"),
            ProviderErrorKind::Network => write!(f, "network"),
            ProviderErrorKind::InvalidRequest => write!(f, "invalid request"),
            ProviderErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Library-level error type for avatar operations.
#[derive(Error, Debug)]
pub enum AvatarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0} is not configured")]
    NotConfigured(String),

    #[error("Content too large: estimated {estimated} tokens exceeds the limit of {max}")]
    ContentTooLarge { estimated: usize, max: usize },

    #[error("Insufficient content: {0}")]
    InsufficientContent(String),

    #[error("Embedding provider error ({kind}): {message}")]
    EmbeddingProvider {
        kind: ProviderErrorKind,
        message: String,
    },

    #[error("LLM provider error ({kind}): {message}")]
    LlmProvider {
        kind: ProviderErrorKind,
        message: String,
    },

    #[error("Content source error: {0}")]
    ContentSource(String),

    #[error("Content not found: {0}")]
    ContentNotFound(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl AvatarError {
    /// Provider classification, if this error came from an external provider.
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            AvatarError::EmbeddingProvider { kind, .. } | AvatarError::LlmProvider { kind, .. } => {
                Some(*kind)
            }
            _ => None,
        }
    }

    /// Whether a caller-side retry with backoff could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.provider_kind(),
            Some(ProviderErrorKind::RateLimit) | Some(ProviderErrorKind::Network)
        )
    }
}

/// Result type alias for avatar operations.
pub type Result<T> = std::result::Result<T, AvatarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_distinguishes_errors() {
        let quota = AvatarError::EmbeddingProvider {
            kind: ProviderErrorKind::RateLimit,
            message: "quota exceeded".to_string(),
        };
        assert_eq!(quota.provider_kind(), Some(ProviderErrorKind::RateLimit));
        assert!(quota.is_retryable());

        let auth = AvatarError::LlmProvider {
            kind: ProviderErrorKind::Auth,
            message: "bad key".to_string(),
        };
        assert!(!auth.is_retryable());

        let too_large = AvatarError::ContentTooLarge {
            estimated: 9000,
            max: 8000,
        };
        assert_eq!(too_large.provider_kind(), None);
        assert!(too_large.to_string().contains("9000"));
    }
}
