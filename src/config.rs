//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Sliding-window rate limiter configuration (outbound sends only).
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Maximum calls admitted within the trailing window.
    pub max_requests: usize,
    /// Window length.
    pub window: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(10),
        }
    }
}

/// Retry policy for rate-limited provider calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(20),
            backoff_factor: 2, // 20s, 40s, 80s, 160s
        }
    }
}

/// Batch processing configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Max items in flight for a named-campaign batch.
    pub campaign_concurrency: usize,
    /// Max items in flight for an all-pending batch (fetch is costlier).
    pub inbox_concurrency: usize,
    /// Max candidate items fetched per job.
    pub fetch_limit: usize,
    /// How long a processed item stays in the dedup cache.
    pub dedup_ttl: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            campaign_concurrency: 8,
            inbox_concurrency: 5,
            fetch_limit: 50,
            dedup_ttl: Duration::from_secs(7 * 24 * 3600), // 7 days
        }
    }
}

/// Instantly.ai provider credentials.
#[derive(Debug, Clone)]
pub struct InstantlyConfig {
    pub api_key: SecretString,
    pub base_url: String,
}

impl InstantlyConfig {
    /// Read credentials from the environment. `INSTANTLY_API_KEY` is
    /// required; `INSTANTLY_API_URL` defaults to the hosted API.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("INSTANTLY_API_KEY")
            .ok()
            .map(|k| k.trim().trim_matches(['"', '\'']).to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("INSTANTLY_API_KEY".into()))?;

        let base_url = std::env::var("INSTANTLY_API_URL")
            .unwrap_or_else(|_| "https://api.instantly.ai".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            api_key: SecretString::from(api_key),
            base_url,
        })
    }
}

/// OpenAI generator configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: SecretString,
    pub model: String,
}

impl OpenAiConfig {
    /// Read generator config from the environment. Returns `None` when
    /// `OPENAI_API_KEY` is absent — the generation capability is then
    /// simply not offered (rather than failing on first use).
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        let model =
            std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        Some(Self {
            api_key: SecretString::from(api_key),
            model,
        })
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub instantly: InstantlyConfig,
    pub openai: Option<OpenAiConfig>,
    pub limiter: LimiterConfig,
    pub retry: RetryPolicy,
    pub batch: BatchConfig,
    pub port: u16,
}

impl Config {
    /// Load the full configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("BORROWER_ASSIST_PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "BORROWER_ASSIST_PORT".into(),
                message: format!("'{raw}' is not a valid port"),
            })?,
            Err(_) => 8000,
        };

        Ok(Self {
            instantly: InstantlyConfig::from_env()?,
            openai: OpenAiConfig::from_env(),
            limiter: LimiterConfig::default(),
            retry: RetryPolicy::default(),
            batch: BatchConfig::default(),
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let limiter = LimiterConfig::default();
        assert_eq!(limiter.max_requests, 100);
        assert_eq!(limiter.window, Duration::from_secs(10));

        let retry = RetryPolicy::default();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_delay, Duration::from_secs(20));
        assert_eq!(retry.backoff_factor, 2);

        let batch = BatchConfig::default();
        assert_eq!(batch.campaign_concurrency, 8);
        assert_eq!(batch.inbox_concurrency, 5);
        assert_eq!(batch.dedup_ttl, Duration::from_secs(604_800));
    }
}
