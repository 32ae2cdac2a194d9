//! OpenAI Chat Completions API provider (non-streaming)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    providers::ChatProvider,
    types::{Completion, Message, Model, Usage},
};

/// OpenAI-compatible chat-completions client
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    /// Create from environment variable
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| Error::InvalidApiKey)?;
        Ok(Self::new(api_key))
    }

    fn build_request<'a>(&self, model: &'a Model, messages: &'a [Message]) -> OpenAIRequest<'a> {
        OpenAIRequest {
            model: &model.id,
            messages: messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            stream: false,
            max_tokens: Some(model.max_tokens),
            temperature: model.temperature,
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAIProvider {
    async fn complete(&self, model: &Model, messages: &[Message]) -> Result<Completion> {
        let url = endpoint(model)?;
        let request = self.build_request(model, messages);

        tracing::debug!(model = %model.id, messages = messages.len(), "chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(Error::RateLimited { retry_after });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error_body(status.as_u16(), &text));
        }

        let body: OpenAIResponse = response.json().await?;
        completion_from_response(body)
    }
}

/// Chat-completions URL for a model; rejects settings no server could accept
fn endpoint(model: &Model) -> Result<String> {
    if model.id.trim().is_empty() {
        return Err(Error::InvalidConfig("model id is empty".to_string()));
    }
    let base = model.base_url.trim().trim_end_matches('/');
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(Error::InvalidConfig(format!(
            "base_url must be an http(s) URL, got '{}'",
            model.base_url
        )));
    }
    Ok(format!("{}/chat/completions", base))
}

/// Turn a non-2xx body into a typed API error, falling back to the raw text
fn parse_error_body(status: u16, text: &str) -> Error {
    match serde_json::from_str::<OpenAIErrorEnvelope>(text) {
        Ok(envelope) => Error::api(
            envelope
                .error
                .error_type
                .unwrap_or_else(|| format!("http_{}", status)),
            envelope.error.message,
        ),
        Err(_) => Error::api(format!("http_{}", status), text.to_string()),
    }
}

fn completion_from_response(body: OpenAIResponse) -> Result<Completion> {
    let choice = body.choices.into_iter().next().ok_or(Error::EmptyResponse)?;
    let text = match choice.message.content {
        Some(text) => text,
        None => {
            return Err(Error::UnexpectedResponse(format!(
                "choice has no text content (finish_reason: {})",
                choice.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }
    };
    if text.trim().is_empty() {
        return Err(Error::EmptyResponse);
    }
    let usage = body
        .usage
        .map(|u| Usage {
            input: u.prompt_tokens,
            output: u.completion_tokens,
        })
        .unwrap_or_default();
    Ok(Completion {
        text,
        usage,
        model: body.model,
    })
}

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorEnvelope {
    error: OpenAIErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorBody {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}
