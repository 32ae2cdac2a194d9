//! Deterministic fallback rules for unusable reasoning output
//!
//! When the reasoner returns nothing the loop can act on, the controller
//! walks the capability set's [`FallbackPolicy`] in order and takes the
//! first rule that proposes an invocation. No match is a reasoning failure.

use serde_json::{Map, Value};

use crate::trajectory::{ToolInvocation, ToolObservation, Trajectory};

/// One heuristic for choosing an action without the reasoner
pub trait FallbackRule: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, request: &str, trajectory: &Trajectory) -> Option<ToolInvocation>;
}

/// Invoke a capability when the request mentions any of the keywords.
///
/// Fires at most once per trajectory: if the capability has already been
/// called, the rule stands aside.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    name: String,
    keywords: Vec<String>,
    capability: String,
    args: Map<String, Value>,
    request_arg: Option<String>,
}

impl KeywordRule {
    pub fn new<I, S>(name: impl Into<String>, keywords: I, capability: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            keywords: keywords
                .into_iter()
                .map(|k| k.into().to_lowercase())
                .collect(),
            capability: capability.into(),
            args: Map::new(),
            request_arg: None,
        }
    }

    /// Fixed argument passed on every fallback call
    pub fn with_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    /// Copy the raw request into the named argument
    pub fn with_request_arg(mut self, key: impl Into<String>) -> Self {
        self.request_arg = Some(key.into());
        self
    }

    fn matches(&self, request: &str) -> bool {
        let request = request.to_lowercase();
        self.keywords.iter().any(|k| request.contains(k.as_str()))
    }
}

impl FallbackRule for KeywordRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, request: &str, trajectory: &Trajectory) -> Option<ToolInvocation> {
        if !self.matches(request) {
            return None;
        }
        if trajectory
            .steps()
            .iter()
            .any(|s| s.invocation.name() == self.capability && !s.invocation.is_finish())
        {
            return None;
        }
        let mut args = self.args.clone();
        if let Some(key) = &self.request_arg {
            args.insert(key.clone(), Value::String(request.trim().to_string()));
        }
        Some(ToolInvocation::Call {
            name: self.capability.clone(),
            args,
        })
    }
}

/// Propose `finish` once the latest step produced a successful observation
#[derive(Debug, Clone, Default)]
pub struct FinishAfterObservationRule;

impl FallbackRule for FinishAfterObservationRule {
    fn name(&self) -> &str {
        "finish_after_observation"
    }

    fn apply(&self, _request: &str, trajectory: &Trajectory) -> Option<ToolInvocation> {
        match trajectory.last_step()?.observation {
            Some(ToolObservation::Success { .. }) => Some(ToolInvocation::Finish),
            _ => None,
        }
    }
}

/// Ordered rules; first match wins
#[derive(Default)]
pub struct FallbackPolicy {
    rules: Vec<Box<dyn FallbackRule>>,
}

impl FallbackPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: impl FallbackRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn push(&mut self, rule: Box<dyn FallbackRule>) {
        self.rules.push(rule);
    }

    /// First matching rule's name and proposed invocation
    pub fn resolve(&self, request: &str, trajectory: &Trajectory) -> Option<(String, ToolInvocation)> {
        self.rules.iter().find_map(|rule| {
            rule.apply(request, trajectory)
                .map(|invocation| (rule.name().to_string(), invocation))
        })
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

impl std::fmt::Debug for FallbackPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackPolicy")
            .field("rules", &self.rule_names())
            .finish()
    }
}
