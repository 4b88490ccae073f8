//! Error types for Borrower Assist.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

/// Configuration-related errors. Raised at startup, never per-item.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mail-provider errors.
///
/// `RateLimited` is the one variant the retry controller acts on; everything
/// else propagates immediately.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider rate limited: {message}")]
    RateLimited {
        message: String,
        /// Provider-suggested wait, taken from a `Retry-After` header.
        retry_after: Option<Duration>,
    },

    #[error("Provider authentication failed: {message}")]
    AuthFailed { message: String },

    #[error("Campaign '{name}' not found")]
    CampaignNotFound { name: String },

    #[error("Provider API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Provider request failed: {0}")]
    Http(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Email account is required to send a reply for item {item_id}")]
    MissingAccount { item_id: String },
}

impl ProviderError {
    /// Whether this error is a throttling signal worth backing off on.
    /// Matches the explicit 429 variant plus rate-limit phrasing embedded
    /// in provider error messages.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Api { message, .. } | Self::Http(message) => {
                let lower = message.to_lowercase();
                lower.contains("rate limit") || lower.contains("too many requests")
            }
            _ => false,
        }
    }

    /// The provider's suggested backoff wait, when the throttling response
    /// carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Reply-generation errors.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Invalid response from model {model}: {reason}")]
    InvalidResponse { model: String, reason: String },
}

/// Job tracking errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} not found")]
    NotFound { id: Uuid },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_variant_classifies() {
        let err = ProviderError::RateLimited {
            message: "429".into(),
            retry_after: None,
        };
        assert!(err.is_rate_limited());
    }

    #[test]
    fn retry_after_hint_surfaces_only_from_rate_limits() {
        let err = ProviderError::RateLimited {
            message: "429".into(),
            retry_after: Some(Duration::from_secs(31)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(31)));

        let err = ProviderError::Http("too many requests".into());
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn rate_limit_message_substring_classifies() {
        let err = ProviderError::Api {
            status: 400,
            message: "Rate limit exceeded, slow down".into(),
        };
        assert!(err.is_rate_limited());

        let err = ProviderError::Http("too many requests".into());
        assert!(err.is_rate_limited());
    }

    #[test]
    fn other_errors_do_not_classify() {
        let err = ProviderError::AuthFailed {
            message: "bad key".into(),
        };
        assert!(!err.is_rate_limited());

        let err = ProviderError::Api {
            status: 500,
            message: "internal error".into(),
        };
        assert!(!err.is_rate_limited());
    }
}
