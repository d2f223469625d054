//! Retry, pacing and URL generation policies for the ingestion loop.

use std::ops::RangeInclusive;
use std::time::Duration;

use crate::config::ConfigError;

/// Placeholder substituted with the numeric ID.
pub const ID_PLACEHOLDER: &str = "{id}";

/// Bounded retry with linear backoff for transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::InvalidRetry(
                "max attempts must be at least 1".to_string(),
            ));
        }
        if backoff_base.is_zero() {
            return Err(ConfigError::InvalidRetry(
                "backoff base must be positive".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            backoff_base,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given failed attempt (1-based): `backoff_base * attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt)
    }
}

/// Fixed pause applied after every ID regardless of outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimit(pub Duration);

impl RateLimit {
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    pub async fn pause(&self) {
        if !self.0.is_zero() {
            tokio::time::sleep(self.0).await;
        }
    }
}

/// Inclusive range of positive IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    start: u32,
    end: u32,
}

impl IdRange {
    pub fn new(start: u32, end: u32) -> Result<Self, ConfigError> {
        if start == 0 || start > end {
            return Err(ConfigError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    /// Number of IDs in the range.
    pub fn count(&self) -> u64 {
        u64::from(self.end - self.start) + 1
    }

    pub fn ids(&self) -> RangeInclusive<u32> {
        self.start..=self.end
    }
}

/// URL template with exactly one `{id}` slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    pub fn parse(template: &str) -> Result<Self, ConfigError> {
        if template.matches(ID_PLACEHOLDER).count() != 1 {
            return Err(ConfigError::InvalidTemplate(format!(
                "{} must contain exactly one {} placeholder",
                template, ID_PLACEHOLDER
            )));
        }
        let sample = template.replace(ID_PLACEHOLDER, "1");
        url::Url::parse(&sample)
            .map_err(|e| ConfigError::InvalidTemplate(format!("{}: {}", template, e)))?;
        Ok(Self(template.to_string()))
    }

    pub fn render(&self, id: u32) -> String {
        self.0.replace(ID_PLACEHOLDER, &id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
