//! Reasoning step: propose the next action for a trajectory
//!
//! The loop controller only sees the [`Reasoner`] trait. [`LlmReasoner`]
//! is the chat-model implementation; it never fails on malformed model
//! output, it returns a [`Proposal`] without an invocation and leaves the
//! decision to the controller's fallback policy.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use stride_ai::{ChatProvider, Message, Model};

use crate::capability::CapabilityDescriptor;
use crate::error::Result;
use crate::trajectory::{FINISH, Thought, ToolInvocation, Trajectory, truncate};

/// What the reasoner wants to do next
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub thought: Thought,
    /// `None` when the output held no usable action
    pub invocation: Option<ToolInvocation>,
}

impl Proposal {
    pub fn new(thought: Thought, invocation: ToolInvocation) -> Self {
        Self {
            thought,
            invocation: Some(invocation),
        }
    }

    /// A proposal the controller must repair with a fallback rule
    pub fn unusable(thought: impl Into<String>) -> Self {
        Self {
            thought: Thought::new(thought),
            invocation: None,
        }
    }
}

/// Opaque reasoning call
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Propose the next action given the trajectory so far, the capabilities
    /// in scope, and the rendered conversation context.
    async fn propose(
        &self,
        trajectory: &Trajectory,
        capabilities: &[CapabilityDescriptor],
        context: &str,
    ) -> Result<Proposal>;
}

const REASONER_SYSTEM_PROMPT: &str = "\
You are the planning step of a tool-using assistant. At each step you read the \
user's request and everything done so far, then choose exactly one next action: \
call one of the available capabilities, or finish.

Available capabilities:
{capabilities}

Rules:
- Call a capability only with arguments that match its parameter schema.
- Never invent capability names.
- Choose \"finish\" as soon as the observations contain enough to answer the request, \
or when no capability can make further progress.

Reply with a single JSON object and nothing else:
{\"thought\": \"<your reasoning>\", \"confidence\": <0.0-1.0>, \
\"tool_name\": \"<capability name or finish>\", \"tool_args\": {<arguments>}}";

/// Chat-model reasoner
pub struct LlmReasoner {
    provider: Arc<dyn ChatProvider>,
    model: Model,
}

impl LlmReasoner {
    pub fn new(provider: Arc<dyn ChatProvider>, model: Model) -> Self {
        Self { provider, model }
    }

    fn system_prompt(capabilities: &[CapabilityDescriptor]) -> String {
        let listing = if capabilities.is_empty() {
            "(none)".to_string()
        } else {
            capabilities
                .iter()
                .map(|c| {
                    format!(
                        "- {}: {}\n  parameters: {}",
                        c.name, c.description, c.parameters
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };
        REASONER_SYSTEM_PROMPT.replace("{capabilities}", &listing)
    }

    fn user_prompt(trajectory: &Trajectory, context: &str) -> String {
        let mut prompt = String::new();
        if !context.trim().is_empty() {
            prompt.push_str("<conversation>\n");
            prompt.push_str(context.trim_end());
            prompt.push_str("\n</conversation>\n\n");
        }
        prompt.push_str("<progress>\n");
        prompt.push_str(&trajectory.render());
        prompt.push_str("</progress>\n\nWhat is the next action?");
        prompt
    }
}

#[async_trait]
impl Reasoner for LlmReasoner {
    async fn propose(
        &self,
        trajectory: &Trajectory,
        capabilities: &[CapabilityDescriptor],
        context: &str,
    ) -> Result<Proposal> {
        let messages = vec![
            Message::system(Self::system_prompt(capabilities)),
            Message::user(Self::user_prompt(trajectory, context)),
        ];
        let completion = self.provider.complete(&self.model, &messages).await?;
        tracing::debug!(
            tokens = completion.usage.total(),
            "reasoner reply: {}",
            truncate(&completion.text, 300)
        );
        Ok(parse_proposal(&completion.text))
    }
}

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap());

/// Pull the first JSON object out of model output: a fenced block if
/// present, otherwise the outermost braces.
pub(crate) fn extract_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    if let Some(caps) = FENCED_JSON.captures(text) {
        if let Ok(Value::Object(map)) = serde_json::from_str(&caps[1]) {
            return Some(map);
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Read a confidence that may arrive as a number or a numeric string
pub(crate) fn read_confidence(value: Option<&Value>) -> Option<f32> {
    match value? {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse::<f32>().ok(),
        _ => None,
    }
}

/// Turn raw reasoner text into a proposal
pub fn parse_proposal(text: &str) -> Proposal {
    let Some(obj) = extract_json_object(text) else {
        return Proposal::unusable(truncate(text.trim(), 500));
    };

    let thought_text = obj
        .get("thought")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    let thought = Thought::new(thought_text).with_confidence(read_confidence(obj.get("confidence")));

    let name = obj
        .get("tool_name")
        .or_else(|| obj.get("action"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    let invocation = if name.is_empty() {
        None
    } else if name.eq_ignore_ascii_case(FINISH) {
        Some(ToolInvocation::Finish)
    } else {
        let args = match obj.get("tool_args").or_else(|| obj.get("action_input")) {
            Some(Value::Object(map)) => Some(map.clone()),
            // Some models send the arguments as an encoded string
            Some(Value::String(s)) => match serde_json::from_str(s) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            },
            None | Some(Value::Null) => Some(serde_json::Map::new()),
            Some(_) => None,
        };
        args.map(|args| ToolInvocation::Call {
            name: name.to_string(),
            args,
        })
    };

    Proposal { thought, invocation }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use stride_ai::{Completion, Usage};

    /// Replies with canned text and records the prompts it was sent
    struct ScriptedProvider {
        replies: Mutex<Vec<String>>,
        prompts: Arc<Mutex<Vec<Vec<Message>>>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
                prompts: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn complete(&self, _model: &Model, messages: &[Message]) -> stride_ai::Result<Completion> {
            self.prompts.lock().push(messages.to_vec());
            let mut replies = self.replies.lock();
            if replies.is_empty() {
                return Err(stride_ai::Error::EmptyResponse);
            }
            Ok(Completion {
                text: replies.remove(0),
                usage: Usage::default(),
                model: "test".into(),
            })
        }
    }

    #[test]
    fn test_parse_plain_json() {
        let p = parse_proposal(
            r#"{"thought": "need the forecast", "confidence": 0.8, "tool_name": "get_weather", "tool_args": {"location": "Paris"}}"#,
        );
        assert_eq!(p.thought.text, "need the forecast");
        assert_eq!(p.thought.confidence, Some(0.8));
        assert_eq!(
            p.invocation,
            Some(ToolInvocation::call("get_weather", json!({"location": "Paris"})))
        );
    }

    #[test]
    fn test_parse_fenced_json_with_prose() {
        let text = "Sure, here is my plan:\n```json\n{\"thought\": \"done\", \"tool_name\": \"FINISH\"}\n```\nThanks!";
        let p = parse_proposal(text);
        assert_eq!(p.invocation, Some(ToolInvocation::Finish));
        assert_eq!(p.thought.confidence, None);
    }

    #[test]
    fn test_parse_string_encoded_args_and_clamped_confidence() {
        let p = parse_proposal(
            r#"{"thought": "t", "confidence": "1.5", "tool_name": "search_events", "tool_args": "{\"location\": \"Rome\"}"}"#,
        );
        assert_eq!(p.thought.confidence, Some(1.0));
        assert_eq!(
            p.invocation,
            Some(ToolInvocation::call("search_events", json!({"location": "Rome"})))
        );
    }

    #[test]
    fn test_parse_missing_args_means_empty() {
        let p = parse_proposal(r#"{"thought": "t", "tool_name": "view_cart"}"#);
        assert_eq!(p.invocation, Some(ToolInvocation::call("view_cart", json!({}))));
    }

    #[test]
    fn test_malformed_output_is_unusable() {
        let p = parse_proposal("I think I should check the weather.");
        assert!(p.invocation.is_none());
        assert_eq!(p.thought.text, "I think I should check the weather.");

        let p = parse_proposal(r#"{"thought": "no tool chosen"}"#);
        assert!(p.invocation.is_none());
        assert_eq!(p.thought.text, "no tool chosen");

        let p = parse_proposal(r#"{"tool_name": "get_weather", "tool_args": [1, 2]}"#);
        assert!(p.invocation.is_none());
    }

    #[tokio::test]
    async fn test_llm_reasoner_prompts_with_capabilities_and_context() {
        let provider = Arc::new(ScriptedProvider::new(&[
            r#"{"thought": "look up", "tool_name": "get_weather", "tool_args": {"location": "Oslo"}}"#,
        ]));
        let prompts = provider.prompts.clone();
        let reasoner = LlmReasoner::new(provider, Model::openai("test-model"));
        let capabilities = vec![CapabilityDescriptor {
            name: "get_weather".into(),
            description: "Current weather".into(),
            parameters: json!({"type": "object"}),
            requires_context: false,
        }];
        let trajectory = Trajectory::new("weather in Oslo?", "weather");

        let proposal = reasoner
            .propose(&trajectory, &capabilities, "Earlier: asked about Bergen")
            .await
            .unwrap();
        assert_eq!(proposal.invocation.unwrap().name(), "get_weather");

        let sent = prompts.lock();
        assert!(sent[0][0].content.contains("- get_weather: Current weather"));
        assert!(sent[0][1].content.contains("Earlier: asked about Bergen"));
        assert!(sent[0][1].content.contains("Request: weather in Oslo?"));
    }

    #[tokio::test]
    async fn test_llm_reasoner_propagates_provider_errors() {
        let reasoner = LlmReasoner::new(Arc::new(ScriptedProvider::new(&[])), Model::openai("m"));
        let trajectory = Trajectory::new("q", "all");
        let err = reasoner.propose(&trajectory, &[], "").await.unwrap_err();
        assert!(matches!(err, crate::Error::Ai(stride_ai::Error::EmptyResponse)));
    }
}
