//! Core types for chat-completion requests

use serde::{Deserialize, Serialize};

/// Message roles understood by chat-completion APIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }
}

/// Model definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Model identifier (e.g., "gpt-4o-mini")
    pub id: String,
    /// Base URL for API calls (without the `/chat/completions` suffix)
    pub base_url: String,
    /// Maximum output tokens
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Model {
    /// Create a model pointing at the public OpenAI endpoint
    pub fn openai(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            max_tokens: 1024,
            temperature: Some(0.0),
        }
    }

    /// Override the base URL (for OpenAI-compatible servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input: u32,
    pub output: u32,
}

impl Usage {
    /// Total tokens for the call
    pub fn total(&self) -> u32 {
        self.input + self.output
    }
}

/// A finished (non-streaming) completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text
    pub text: String,
    /// Token usage reported by the provider
    #[serde(default)]
    pub usage: Usage,
    /// Model that actually answered
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors_set_role() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(json.contains("\"role\":\"user\""));
    }

    #[test]
    fn test_message_serializes_role_and_content_only() {
        let json = serde_json::to_value(Message::assistant("done")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "done"}));
    }

    #[test]
    fn test_model_base_url_override() {
        let model = Model::openai("gpt-4o-mini").with_base_url("http://localhost:11434/v1");
        assert_eq!(model.base_url, "http://localhost:11434/v1");
        assert_eq!(model.id, "gpt-4o-mini");
    }

    #[test]
    fn test_usage_total() {
        let usage = Usage { input: 10, output: 5 };
        assert_eq!(usage.total(), 15);
    }
}
