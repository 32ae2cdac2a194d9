//! Chat-completion provider implementations

pub mod openai;
pub mod retry;

pub use retry::{RetryConfig, RetryingProvider};

use crate::{Completion, Error, Message, Model, Result};
use async_trait::async_trait;

/// Trait for chat-completion providers
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send the messages and wait for the full completion
    async fn complete(&self, model: &Model, messages: &[Message]) -> Result<Completion>;
}

/// Get an API key from a provided value or the environment
pub fn get_api_key(provided: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(key) = provided.filter(|k| !k.trim().is_empty()) {
        return Ok(key.to_string());
    }

    std::env::var(env_var).map_err(|_| Error::InvalidApiKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_api_key_prefers_provided() {
        let key = get_api_key(Some("sk-provided"), "STRIDE_TEST_UNSET_VAR").unwrap();
        assert_eq!(key, "sk-provided");
    }

    #[test]
    fn test_get_api_key_missing() {
        let err = get_api_key(Some("  "), "STRIDE_TEST_DEFINITELY_UNSET_VAR").unwrap_err();
        assert!(matches!(err, Error::InvalidApiKey));
    }
}
