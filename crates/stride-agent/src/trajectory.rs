//! Trajectory model: the append-only record of one reasoning task.
//!
//! A [`Trajectory`] is created when a query starts, grows one
//! [`TrajectoryStep`] per loop iteration, and is frozen once it carries a
//! [`Termination`]. Steps are never handed out mutably; the only way to
//! change a trajectory's step list is [`Trajectory::append`], which assigns
//! the next 1-based index and enforces the observation rules:
//!
//! - a `finish` step never has an observation
//! - every capability call has exactly one observation, and it is never
//!   `not_executed`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Name the reasoner uses for the finish sentinel
pub const FINISH: &str = "finish";

/// The action chosen at one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolInvocation {
    /// Invoke a registered capability
    Call {
        name: String,
        #[serde(default)]
        args: Map<String, Value>,
    },
    /// Stop the loop; never dispatched
    Finish,
}

impl ToolInvocation {
    /// Build a capability call. Non-object `args` are treated as no arguments.
    pub fn call(name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::Call {
            name: name.into(),
            args,
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, Self::Finish)
    }

    /// Capability name, or `finish` for the sentinel
    pub fn name(&self) -> &str {
        match self {
            Self::Call { name, .. } => name,
            Self::Finish => FINISH,
        }
    }

    pub fn args(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Call { args, .. } => Some(args),
            Self::Finish => None,
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Call { name, args } => {
                format!("{}({})", name, Value::Object(args.clone()))
            }
            Self::Finish => FINISH.to_string(),
        }
    }
}

/// Outcome of dispatching one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolObservation {
    Success { value: Value },
    Error { message: String },
    Timeout { after_ms: u64 },
    NotExecuted,
}

/// Status of an observation without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationStatus {
    Success,
    Error,
    Timeout,
    NotExecuted,
}

impl ToolObservation {
    pub fn success(value: Value) -> Self {
        Self::Success { value }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn status(&self) -> ObservationStatus {
        match self {
            Self::Success { .. } => ObservationStatus::Success,
            Self::Error { .. } => ObservationStatus::Error,
            Self::Timeout { .. } => ObservationStatus::Timeout,
            Self::NotExecuted => ObservationStatus::NotExecuted,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Text form shown to the reasoner
    pub fn render(&self) -> String {
        match self {
            Self::Success { value: Value::String(s) } => s.clone(),
            Self::Success { value } => value.to_string(),
            Self::Error { message } => format!("Error: {}", message),
            Self::Timeout { after_ms } => format!("Timed out after {} ms", after_ms),
            Self::NotExecuted => "(not executed)".to_string(),
        }
    }
}

/// Free-text rationale for a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Thought {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
        }
    }

    /// Attach a confidence score, clamped to [0, 1]; NaN is dropped
    pub fn with_confidence(mut self, confidence: Option<f32>) -> Self {
        self.confidence = confidence
            .filter(|c| !c.is_nan())
            .map(|c| c.clamp(0.0, 1.0));
        self
    }
}

/// One appended step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStep {
    /// 1-based, contiguous within the trajectory
    pub index: u32,
    pub thought: Thought,
    pub invocation: ToolInvocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<ToolObservation>,
    pub recorded_at: DateTime<Utc>,
}

/// Which budget ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "limit", rename_all = "snake_case")]
pub enum BudgetLimit {
    Iterations { max: u32 },
    Duration { max_ms: u64 },
}

/// How a trajectory ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// Last step is `finish`
    Finished,
    /// Halted by the controller before the reasoner finished
    BudgetExhausted { limit: BudgetLimit },
    /// Reasoning produced nothing usable and no fallback matched
    Failed { reason: String },
}

/// Ordered record of one query's execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub id: Uuid,
    pub request: String,
    pub capability_set: String,
    steps: Vec<TrajectoryStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    termination: Option<Termination>,
    #[serde(default)]
    metadata: Map<String, Value>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Trajectory {
    pub fn new(request: impl Into<String>, capability_set: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request: request.into(),
            capability_set: capability_set.into(),
            steps: Vec::new(),
            termination: None,
            metadata: Map::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Append the next step. Appending `finish` terminates the trajectory.
    pub fn append(
        &mut self,
        thought: Thought,
        invocation: ToolInvocation,
        observation: Option<ToolObservation>,
    ) -> Result<&TrajectoryStep> {
        if let Some(termination) = &self.termination {
            return Err(Error::Trajectory(format!(
                "trajectory {} is already terminated ({:?})",
                self.id, termination
            )));
        }
        match (&invocation, &observation) {
            (ToolInvocation::Finish, Some(obs)) => {
                return Err(Error::Trajectory(format!(
                    "finish step cannot carry an observation (got {:?})",
                    obs.status()
                )));
            }
            (ToolInvocation::Call { name, .. }, None) => {
                return Err(Error::Trajectory(format!(
                    "call to '{}' is missing its observation",
                    name
                )));
            }
            (ToolInvocation::Call { name, .. }, Some(ToolObservation::NotExecuted)) => {
                return Err(Error::Trajectory(format!(
                    "call to '{}' cannot be marked not_executed",
                    name
                )));
            }
            _ => {}
        }

        let finished = invocation.is_finish();
        let index = self.steps.len() as u32 + 1;
        self.steps.push(TrajectoryStep {
            index,
            thought,
            invocation,
            observation,
            recorded_at: Utc::now(),
        });
        if finished {
            self.close(Termination::Finished);
        }
        Ok(&self.steps[self.steps.len() - 1])
    }

    /// Mark the trajectory as halted by a budget check
    pub fn terminate_budget(&mut self, limit: BudgetLimit) -> Result<()> {
        self.terminate(Termination::BudgetExhausted { limit })
    }

    /// Mark the trajectory as failed
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.terminate(Termination::Failed {
            reason: reason.into(),
        })
    }

    fn terminate(&mut self, termination: Termination) -> Result<()> {
        if let Some(existing) = &self.termination {
            return Err(Error::Trajectory(format!(
                "trajectory {} is already terminated ({:?})",
                self.id, existing
            )));
        }
        self.close(termination);
        Ok(())
    }

    fn close(&mut self, termination: Termination) {
        self.termination = Some(termination);
        self.finished_at = Some(Utc::now());
    }

    pub fn steps(&self) -> &[TrajectoryStep] {
        &self.steps
    }

    pub fn last_step(&self) -> Option<&TrajectoryStep> {
        self.steps.last()
    }

    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    /// Complete means finished cleanly or halted by budget; failed is not complete
    pub fn is_complete(&self) -> bool {
        matches!(
            self.termination,
            Some(Termination::Finished) | Some(Termination::BudgetExhausted { .. })
        )
    }

    pub fn is_budget_limited(&self) -> bool {
        matches!(self.termination, Some(Termination::BudgetExhausted { .. }))
    }

    pub fn iteration_count(&self) -> u32 {
        self.steps.len() as u32
    }

    /// Distinct capability names in first-use order (the finish sentinel is not a capability)
    pub fn capabilities_used(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for step in &self.steps {
            if let ToolInvocation::Call { name, .. } = &step.invocation {
                if !names.iter().any(|n| n == name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Most recent successful observation value, if any
    pub fn last_success(&self) -> Option<&Value> {
        self.steps.iter().rev().find_map(|s| match &s.observation {
            Some(ToolObservation::Success { value }) => Some(value),
            _ => None,
        })
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Attach conversation-tracking information; never touches steps
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Plain-text transcript used in prompts and summaries
    pub fn render(&self) -> String {
        let mut out = format!("Request: {}\n", self.request);
        for step in &self.steps {
            out.push_str(&format!("[{}] Thought: {}", step.index, step.thought.text));
            if let Some(c) = step.thought.confidence {
                out.push_str(&format!(" (confidence {:.2})", c));
            }
            out.push('\n');
            out.push_str(&format!("    Action: {}\n", step.invocation.render()));
            if let Some(obs) = &step.observation {
                out.push_str(&format!("    Observation: {}\n", truncate(&obs.render(), 2000)));
            }
        }
        match &self.termination {
            Some(Termination::Finished) => out.push_str("Outcome: finished\n"),
            Some(Termination::BudgetExhausted { limit }) => {
                out.push_str(&format!("Outcome: stopped by budget ({:?})\n", limit))
            }
            Some(Termination::Failed { reason }) => {
                out.push_str(&format!("Outcome: failed ({})\n", reason))
            }
            None => {}
        }
        out
    }
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...(truncated)", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn weather_call() -> ToolInvocation {
        ToolInvocation::call("get_weather", json!({"location": "Paris"}))
    }

    #[test]
    fn test_indices_are_contiguous_from_one() {
        let mut t = Trajectory::new("weather in Paris?", "weather");
        t.append(
            Thought::new("look it up"),
            weather_call(),
            Some(ToolObservation::success(json!("sunny"))),
        )
        .unwrap();
        t.append(
            Thought::new("again"),
            weather_call(),
            Some(ToolObservation::error("rate limited")),
        )
        .unwrap();
        t.append(Thought::new("done"), ToolInvocation::Finish, None)
            .unwrap();

        let indices: Vec<u32> = t.steps().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(t.termination(), Some(&Termination::Finished));
        assert!(t.is_complete());
        assert!(t.finished_at.is_some());
    }

    #[test]
    fn test_finish_rejects_observation() {
        let mut t = Trajectory::new("q", "all");
        let err = t
            .append(
                Thought::new("done"),
                ToolInvocation::Finish,
                Some(ToolObservation::NotExecuted),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Trajectory(_)));
        assert!(t.steps().is_empty());
    }

    #[test]
    fn test_call_requires_observation() {
        let mut t = Trajectory::new("q", "all");
        assert!(t.append(Thought::new("x"), weather_call(), None).is_err());
        assert!(
            t.append(
                Thought::new("x"),
                weather_call(),
                Some(ToolObservation::NotExecuted)
            )
            .is_err()
        );
        assert_eq!(t.iteration_count(), 0);
    }

    #[test]
    fn test_no_append_after_termination() {
        let mut t = Trajectory::new("q", "all");
        t.terminate_budget(BudgetLimit::Iterations { max: 0 }).unwrap();
        let err = t
            .append(Thought::new("late"), ToolInvocation::Finish, None)
            .unwrap_err();
        assert!(err.to_string().contains("already terminated"));
        assert!(t.is_budget_limited());
        assert!(t.is_complete());
    }

    #[test]
    fn test_termination_is_set_once() {
        let mut t = Trajectory::new("q", "all");
        t.fail("no usable action").unwrap();
        assert!(t.terminate_budget(BudgetLimit::Iterations { max: 1 }).is_err());
        assert!(!t.is_complete());
    }

    #[test]
    fn test_capabilities_used_deduplicates_in_order() {
        let mut t = Trajectory::new("q", "all");
        for name in ["search_events", "get_weather", "search_events"] {
            t.append(
                Thought::new("step"),
                ToolInvocation::call(name, json!({})),
                Some(ToolObservation::success(json!(null))),
            )
            .unwrap();
        }
        t.append(Thought::new("done"), ToolInvocation::Finish, None)
            .unwrap();
        assert_eq!(t.capabilities_used(), vec!["search_events", "get_weather"]);
    }

    #[test]
    fn test_thought_confidence_is_clamped() {
        assert_eq!(Thought::new("t").with_confidence(Some(1.7)).confidence, Some(1.0));
        assert_eq!(Thought::new("t").with_confidence(Some(-0.2)).confidence, Some(0.0));
        assert_eq!(Thought::new("t").with_confidence(Some(f32::NAN)).confidence, None);
    }

    #[test]
    fn test_render_includes_actions_and_outcome() {
        let mut t = Trajectory::new("weather in Paris?", "weather");
        t.append(
            Thought::new("check the forecast"),
            weather_call(),
            Some(ToolObservation::success(json!({"forecast": "sunny"}))),
        )
        .unwrap();
        t.append(Thought::new("enough"), ToolInvocation::Finish, None)
            .unwrap();
        let text = t.render();
        assert!(text.contains("Request: weather in Paris?"));
        assert!(text.contains("[1] Thought: check the forecast"));
        assert!(text.contains("Action: get_weather("));
        assert!(text.contains("sunny"));
        assert!(text.contains("[2] Thought: enough"));
        assert!(text.contains("Outcome: finished"));
    }

    #[test]
    fn test_serde_preserves_steps_and_termination() {
        let mut t = Trajectory::new("q", "weather");
        t.append(
            Thought::new("a").with_confidence(Some(0.5)),
            weather_call(),
            Some(ToolObservation::Timeout { after_ms: 30 }),
        )
        .unwrap();
        t.terminate_budget(BudgetLimit::Duration { max_ms: 100 }).unwrap();
        t.set_metadata("turn", json!(2));

        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"status\":\"timeout\""));
        let back: Trajectory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_truncate_long_text() {
        let long = "x".repeat(50);
        let cut = truncate(&long, 10);
        assert!(cut.starts_with("xxxxxxxxxx"));
        assert!(cut.ends_with("...(truncated)"));
        assert_eq!(truncate("short", 10), "short");
    }
}
