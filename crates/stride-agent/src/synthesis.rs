//! Answer synthesis and batch summarization

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use stride_ai::{ChatProvider, Message, Model};

use crate::error::{Error, Result};
use crate::reasoning::{extract_json_object, read_confidence};
use crate::trajectory::{Termination, Trajectory, truncate};

/// Confidence ceiling for answers built from a budget-halted trajectory
pub const BUDGET_CONFIDENCE_CAP: f32 = 0.5;

/// Confidence used when the synthesizer replied with prose instead of JSON
const UNSTRUCTURED_CONFIDENCE: f32 = 0.5;

/// Final answer for one trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub answer: String,
    pub rationale: String,
    pub confidence: f32,
}

impl Synthesis {
    pub fn new(answer: impl Into<String>, rationale: impl Into<String>, confidence: f32) -> Self {
        Self {
            answer: answer.into(),
            rationale: rationale.into(),
            confidence: if confidence.is_nan() {
                0.0
            } else {
                confidence.clamp(0.0, 1.0)
            },
        }
    }

    /// Lower confidence to at most `cap`
    pub fn capped(mut self, cap: f32) -> Self {
        self.confidence = self.confidence.min(cap);
        self
    }
}

/// Produces the final answer for a complete trajectory.
/// Must answer budget-halted trajectories too.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, trajectory: &Trajectory) -> Result<Synthesis>;
}

/// Condenses evicted trajectories into a digest.
/// `previous` is the digest being folded into the new one, if any.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, batch: &[Trajectory], previous: Option<&str>) -> Result<String>;
}

const SYNTHESIS_SYSTEM_PROMPT: &str = "\
You write the final answer for a tool-using assistant. You are given the user's \
request and the full record of actions taken and observations received. Answer \
the request using only what the observations support.

Reply with a single JSON object and nothing else:
{\"answer\": \"<answer for the user>\", \"rationale\": \"<how the observations support it>\", \
\"confidence\": <0.0-1.0>}";

const BUDGET_NOTE: &str = "\
Note: this record was stopped by a step or time limit before the assistant \
decided it was done. Give the best answer the observations allow and say what \
is missing.";

const SUMMARY_SYSTEM_PROMPT: &str = "\
You are a specialized summarization model. You condense earlier exchanges of a \
conversation between a user and a tool-using assistant. The summary replaces \
those exchanges in the assistant's context, so keep every fact needed to \
continue the conversation.";

const SUMMARY_PROMPT: &str = "\
Summarize the exchanges below. Cover:

1. **Requests**: what the user asked for
2. **Findings**: the key facts the capabilities returned
3. **Answers**: what the assistant concluded
4. **Open Items**: anything left unresolved

Be concise.

<exchanges>
{exchanges}
</exchanges>";

const UPDATE_SUMMARY_PROMPT: &str = "\
Below is an existing summary of earlier exchanges, followed by more exchanges \
that are now leaving the context. Produce one updated summary that integrates both.

<previous-summary>
{previous_summary}
</previous-summary>

Cover:

1. **Requests**: what the user asked for, earlier and now
2. **Findings**: the key facts the capabilities returned
3. **Answers**: what the assistant concluded
4. **Open Items**: anything left unresolved

Be concise.

<exchanges>
{exchanges}
</exchanges>";

/// Chat-model synthesizer and summarizer
pub struct LlmSynthesizer {
    provider: Arc<dyn ChatProvider>,
    model: Model,
}

impl LlmSynthesizer {
    pub fn new(provider: Arc<dyn ChatProvider>, model: Model) -> Self {
        Self { provider, model }
    }
}

#[async_trait]
impl Synthesizer for LlmSynthesizer {
    async fn synthesize(&self, trajectory: &Trajectory) -> Result<Synthesis> {
        let budget_limited = trajectory.is_budget_limited();
        let mut prompt = format!("<record>\n{}</record>", trajectory.render());
        if budget_limited {
            prompt.push_str("\n\n");
            prompt.push_str(BUDGET_NOTE);
        }
        let messages = vec![
            Message::system(SYNTHESIS_SYSTEM_PROMPT),
            Message::user(prompt),
        ];
        let completion = self.provider.complete(&self.model, &messages).await?;
        let synthesis = parse_synthesis(&completion.text)?;
        Ok(if budget_limited {
            synthesis.capped(BUDGET_CONFIDENCE_CAP)
        } else {
            synthesis
        })
    }
}

#[async_trait]
impl Summarizer for LlmSynthesizer {
    async fn summarize(&self, batch: &[Trajectory], previous: Option<&str>) -> Result<String> {
        let exchanges = serialize_batch(batch);
        let prompt = match previous {
            Some(prev) => UPDATE_SUMMARY_PROMPT
                .replace("{previous_summary}", prev)
                .replace("{exchanges}", &exchanges),
            None => SUMMARY_PROMPT.replace("{exchanges}", &exchanges),
        };
        let messages = vec![Message::system(SUMMARY_SYSTEM_PROMPT), Message::user(prompt)];
        let completion = self.provider.complete(&self.model, &messages).await?;
        let summary = completion.text.trim().to_string();
        if summary.is_empty() {
            return Err(Error::Synthesis("summarizer returned an empty digest".into()));
        }
        Ok(summary)
    }
}

/// Parse a synthesizer reply. Prose replies become the answer verbatim.
pub fn parse_synthesis(text: &str) -> Result<Synthesis> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::Synthesis("synthesizer returned no text".into()));
    }
    let Some(obj) = extract_json_object(trimmed) else {
        return Ok(Synthesis::new(trimmed, "", UNSTRUCTURED_CONFIDENCE));
    };
    let answer = obj
        .get("answer")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if answer.is_empty() {
        return Err(Error::Synthesis("synthesizer reply has no answer".into()));
    }
    let rationale = obj
        .get("rationale")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let confidence = read_confidence(obj.get("confidence")).unwrap_or(UNSTRUCTURED_CONFIDENCE);
    Ok(Synthesis::new(answer, rationale, confidence))
}

/// Plain-text form of a batch for the summarization prompt
fn serialize_batch(batch: &[Trajectory]) -> String {
    batch
        .iter()
        .map(|t| {
            let mut text = t.render();
            if let Some(answer) = t.metadata().get("answer").and_then(Value::as_str) {
                text.push_str(&format!("Answer: {}\n", truncate(answer, 1000)));
            }
            text
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Deterministic summarizer: one line per trajectory
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestSummarizer;

impl DigestSummarizer {
    pub fn digest(batch: &[Trajectory], previous: Option<&str>) -> String {
        let mut lines: Vec<String> = previous
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| vec![p.to_string()])
            .unwrap_or_default();
        for t in batch {
            lines.push(format!(
                "- {} => {}",
                truncate(t.request.trim(), 200),
                truncate(&outcome_line(t), 200)
            ));
        }
        lines.join("\n")
    }
}

#[async_trait]
impl Summarizer for DigestSummarizer {
    async fn summarize(&self, batch: &[Trajectory], previous: Option<&str>) -> Result<String> {
        Ok(Self::digest(batch, previous))
    }
}

fn outcome_line(trajectory: &Trajectory) -> String {
    if let Some(answer) = trajectory.metadata().get("answer").and_then(Value::as_str) {
        return answer.trim().to_string();
    }
    match trajectory.termination() {
        Some(Termination::Finished) => format!("finished after {} steps", trajectory.iteration_count()),
        Some(Termination::BudgetExhausted { .. }) => {
            format!("stopped by budget after {} steps", trajectory.iteration_count())
        }
        Some(Termination::Failed { reason }) => format!("failed: {}", reason),
        None => "in progress".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::{BudgetLimit, Thought, ToolInvocation, ToolObservation};
    use parking_lot::Mutex;
    use serde_json::json;
    use stride_ai::{Completion, Usage};

    struct CannedProvider {
        reply: String,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl CannedProvider {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl ChatProvider for CannedProvider {
        async fn complete(&self, _model: &Model, messages: &[Message]) -> stride_ai::Result<Completion> {
            if let Some(last) = messages.last() {
                self.prompts.lock().push(last.content.clone());
            }
            Ok(Completion {
                text: self.reply.clone(),
                usage: Usage::default(),
                model: "test".into(),
            })
        }
    }

    fn finished_trajectory(request: &str) -> Trajectory {
        let mut t = Trajectory::new(request, "weather");
        t.append(
            Thought::new("look"),
            ToolInvocation::call("get_weather", json!({"location": "Paris"})),
            Some(ToolObservation::success(json!("sunny, 24C"))),
        )
        .unwrap();
        t.append(Thought::new("done"), ToolInvocation::Finish, None)
            .unwrap();
        t
    }

    #[test]
    fn test_parse_synthesis_json() {
        let s = parse_synthesis(
            r#"{"answer": "It is sunny.", "rationale": "forecast said so", "confidence": 0.9}"#,
        )
        .unwrap();
        assert_eq!(s.answer, "It is sunny.");
        assert_eq!(s.rationale, "forecast said so");
        assert!((s.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_parse_synthesis_prose_falls_back() {
        let s = parse_synthesis("It will be sunny in Paris.").unwrap();
        assert_eq!(s.answer, "It will be sunny in Paris.");
        assert_eq!(s.confidence, 0.5);
    }

    #[test]
    fn test_parse_synthesis_rejects_empty() {
        assert!(parse_synthesis("   ").is_err());
        assert!(parse_synthesis(r#"{"answer": "", "confidence": 1}"#).is_err());
    }

    #[tokio::test]
    async fn test_budget_limited_confidence_is_capped() {
        let provider = Arc::new(CannedProvider::new(
            r#"{"answer": "Probably sunny.", "rationale": "partial", "confidence": 0.95}"#,
        ));
        let prompts = provider.prompts.clone();
        let synthesizer = LlmSynthesizer::new(provider, Model::openai("m"));

        let mut t = Trajectory::new("weather?", "weather");
        t.append(
            Thought::new("look"),
            ToolInvocation::call("get_weather", json!({})),
            Some(ToolObservation::success(json!("sunny"))),
        )
        .unwrap();
        t.terminate_budget(BudgetLimit::Iterations { max: 1 }).unwrap();

        let s = synthesizer.synthesize(&t).await.unwrap();
        assert_eq!(s.answer, "Probably sunny.");
        assert_eq!(s.confidence, BUDGET_CONFIDENCE_CAP);
        assert!(prompts.lock()[0].contains("stopped by a step or time limit"));
    }

    #[tokio::test]
    async fn test_llm_summary_uses_update_prompt_with_previous() {
        let provider = Arc::new(CannedProvider::new("User asked about Paris weather."));
        let prompts = provider.prompts.clone();
        let summarizer = LlmSynthesizer::new(provider, Model::openai("m"));
        let batch = vec![finished_trajectory("weather in Paris?")];

        let first = summarizer.summarize(&batch, None).await.unwrap();
        assert_eq!(first, "User asked about Paris weather.");
        summarizer
            .summarize(&batch, Some("Earlier: asked about Rome"))
            .await
            .unwrap();

        let sent = prompts.lock();
        assert!(!sent[0].contains("<previous-summary>"));
        assert!(sent[0].contains("Request: weather in Paris?"));
        assert!(sent[1].contains("<previous-summary>\nEarlier: asked about Rome\n</previous-summary>"));
    }

    #[tokio::test]
    async fn test_digest_summarizer_lines() {
        let mut answered = finished_trajectory("weather in Paris?");
        answered.set_metadata("answer", json!("Sunny and warm."));
        let mut halted = Trajectory::new("events in Rome?", "events");
        halted.terminate_budget(BudgetLimit::Iterations { max: 0 }).unwrap();

        let digest = DigestSummarizer
            .summarize(&[answered, halted], Some("- earlier => fine"))
            .await
            .unwrap();
        assert_eq!(
            digest,
            "- earlier => fine\n- weather in Paris? => Sunny and warm.\n- events in Rome? => stopped by budget after 0 steps"
        );
    }
}
