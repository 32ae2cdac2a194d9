//! Retry wrapper for chat providers

use async_trait::async_trait;
use std::time::Duration;

use super::ChatProvider;
use crate::{Completion, Error, Message, Model, Result};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }

    /// Delay before retrying `error`; a server-sent `retry-after` wins
    fn delay_for(&self, error: &Error, attempt: u32) -> Duration {
        match error {
            Error::RateLimited {
                retry_after: Some(secs),
            } => Duration::from_secs(*secs).min(self.max_delay),
            _ => self.delay_for_attempt(attempt),
        }
    }
}

/// Retries retryable failures of the wrapped provider with exponential backoff
pub struct RetryingProvider<P> {
    inner: P,
    config: RetryConfig,
}

impl<P: ChatProvider> RetryingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            config: RetryConfig::default(),
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl<P: ChatProvider> ChatProvider for RetryingProvider<P> {
    async fn complete(&self, model: &Model, messages: &[Message]) -> Result<Completion> {
        let mut attempt = 0u32;
        loop {
            match self.inner.complete(model, messages).await {
                Ok(completion) => return Ok(completion),
                Err(e) if attempt < self.config.max_retries && e.is_retryable() => {
                    let delay = self.config.delay_for(&e, attempt);
                    tracing::warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt + 1,
                        self.config.max_retries + 1,
                        e,
                        delay
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
