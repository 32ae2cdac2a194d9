//! Bounded conversation history
//!
//! Keeps at most `max_trajectories` finished trajectories verbatim. When an
//! `add` pushes the window over its limit, the oldest trajectories outside
//! the protected head (`preserve_first`) and tail (`preserve_last`) are
//! evicted. Evicted trajectories are condensed into a
//! [`ConversationSummary`] or dropped, depending on `summarize_removed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::synthesis::{DigestSummarizer, Summarizer};
use crate::trajectory::{Trajectory, truncate};

/// Window shape for [`ConversationHistory`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationHistoryConfig {
    /// Active trajectories retained verbatim
    pub max_trajectories: usize,
    /// Earliest trajectories that are never evicted
    pub preserve_first: usize,
    /// Latest trajectories that are never evicted
    pub preserve_last: usize,
    /// Condense evicted trajectories into a summary instead of dropping them
    pub summarize_removed: bool,
    /// Cap on stored summaries; the newest is folded into the next one at the cap.
    /// `None` keeps every summary.
    pub max_summaries: Option<usize>,
}

impl Default for ConversationHistoryConfig {
    fn default() -> Self {
        Self {
            max_trajectories: 10,
            preserve_first: 1,
            preserve_last: 3,
            summarize_removed: true,
            max_summaries: Some(1),
        }
    }
}

impl ConversationHistoryConfig {
    pub fn new(max_trajectories: usize, preserve_first: usize, preserve_last: usize) -> Self {
        Self {
            max_trajectories,
            preserve_first,
            preserve_last,
            ..Self::default()
        }
    }

    pub fn with_summarize_removed(mut self, summarize_removed: bool) -> Self {
        self.summarize_removed = summarize_removed;
        self
    }

    pub fn with_max_summaries(mut self, max_summaries: Option<usize>) -> Self {
        self.max_summaries = max_summaries;
        self
    }

    /// Reject shapes with no valid eviction set
    pub fn validate(&self) -> Result<()> {
        if self.preserve_first + self.preserve_last > self.max_trajectories {
            return Err(Error::WindowConfiguration {
                max_trajectories: self.max_trajectories,
                preserve_first: self.preserve_first,
                preserve_last: self.preserve_last,
            });
        }
        if self.max_summaries == Some(0) {
            return Err(Error::Other(
                "max_summaries must be at least 1 (use none for unlimited)".into(),
            ));
        }
        Ok(())
    }
}

/// Digest of evicted trajectories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub trajectory_count: usize,
    pub step_count: usize,
    pub tools_used: BTreeSet<String>,
    pub digest: String,
    /// Ids of the summarized trajectories, in eviction order
    pub covered: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ConversationSummary {
    fn from_batch(batch: &[Trajectory], digest: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            trajectory_count: batch.len(),
            step_count: batch.iter().map(|t| t.steps().len()).sum(),
            tools_used: batch.iter().flat_map(|t| t.capabilities_used()).collect(),
            digest,
            covered: batch.iter().map(|t| t.id).collect(),
            created_at: Utc::now(),
        }
    }

    /// Combine an older summary with this one; the digest is already merged
    fn absorb(mut self, older: ConversationSummary) -> Self {
        self.trajectory_count += older.trajectory_count;
        self.step_count += older.step_count;
        self.tools_used.extend(older.tools_used);
        let mut covered = older.covered;
        covered.append(&mut self.covered);
        self.covered = covered;
        self
    }
}

/// Running counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub trajectories_added: usize,
    pub trajectories_evicted: usize,
    /// Evicted without a summary
    pub trajectories_dropped: usize,
    /// Steps in dropped trajectories
    pub steps_dropped: usize,
}

/// What an `add` did to the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    /// Nothing evicted
    Retained,
    /// Evicted trajectories went into a summary
    Summarized { trajectories: usize, steps: usize },
    /// Evicted trajectories were discarded
    Dropped { trajectories: usize, steps: usize },
    /// The trajectory had not finished and was not added
    Rejected,
}

/// Summaries then active trajectories, both oldest first
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextView<'a> {
    pub summaries: &'a [ConversationSummary],
    pub trajectories: &'a [Trajectory],
}

impl ContextView<'_> {
    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty() && self.trajectories.is_empty()
    }

    /// Free-text conversation context for the reasoner
    pub fn render(&self) -> String {
        let mut out = String::new();
        for summary in self.summaries {
            let tools = if summary.tools_used.is_empty() {
                "none".to_string()
            } else {
                summary.tools_used.iter().cloned().collect::<Vec<_>>().join(", ")
            };
            out.push_str(&format!(
                "[Summary of {} earlier exchanges, {} steps, capabilities: {}]\n{}\n\n",
                summary.trajectory_count, summary.step_count, tools, summary.digest
            ));
        }
        for (i, t) in self.trajectories.iter().enumerate() {
            out.push_str(&format!("[Exchange {}] User: {}\n", i + 1, t.request));
            let used = t.capabilities_used();
            if !used.is_empty() {
                out.push_str(&format!("Capabilities used: {}\n", used.join(", ")));
            }
            match t.metadata().get("answer").and_then(|v| v.as_str()) {
                Some(answer) => out.push_str(&format!("Assistant: {}\n", truncate(answer, 1000))),
                None => out.push_str("Assistant: (no answer recorded)\n"),
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

/// Ordered active trajectories plus summaries of evicted ones
pub struct ConversationHistory {
    config: ConversationHistoryConfig,
    active: Vec<Trajectory>,
    summaries: Vec<ConversationSummary>,
    stats: HistoryStats,
    summarizer: Arc<dyn Summarizer>,
}

impl ConversationHistory {
    /// Fails fast on a window shape with no valid eviction set
    pub fn new(config: ConversationHistoryConfig, summarizer: Arc<dyn Summarizer>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            active: Vec::new(),
            summaries: Vec::new(),
            stats: HistoryStats::default(),
            summarizer,
        })
    }

    /// History that summarizes with [`DigestSummarizer`]
    pub fn with_digest(config: ConversationHistoryConfig) -> Result<Self> {
        Self::new(config, Arc::new(DigestSummarizer))
    }

    pub fn config(&self) -> &ConversationHistoryConfig {
        &self.config
    }

    pub fn active(&self) -> &[Trajectory] {
        &self.active
    }

    pub fn summaries(&self) -> &[ConversationSummary] {
        &self.summaries
    }

    pub fn stats(&self) -> HistoryStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Append a completed trajectory and re-apply the window. Trajectories
    /// that are still running or failed are left out.
    pub async fn add(&mut self, trajectory: Trajectory) -> WindowOutcome {
        if !trajectory.is_complete() {
            tracing::warn!(
                trajectory = %trajectory.id,
                "refusing to add an incomplete trajectory to history"
            );
            return WindowOutcome::Rejected;
        }
        self.active.push(trajectory);
        self.stats.trajectories_added += 1;

        let max = self.config.max_trajectories;
        if self.active.len() <= max {
            return WindowOutcome::Retained;
        }

        // preserve_first + preserve_last <= max, so the middle holds at least `excess`
        let excess = self.active.len() - max;
        let start = self.config.preserve_first;
        let evicted: Vec<Trajectory> = self.active.drain(start..start + excess).collect();
        let steps: usize = evicted.iter().map(|t| t.steps().len()).sum();
        self.stats.trajectories_evicted += evicted.len();

        tracing::debug!(
            evicted = evicted.len(),
            steps,
            active = self.active.len(),
            "history window exceeded"
        );

        if !self.config.summarize_removed {
            self.stats.trajectories_dropped += evicted.len();
            self.stats.steps_dropped += steps;
            return WindowOutcome::Dropped {
                trajectories: evicted.len(),
                steps,
            };
        }

        let count = evicted.len();
        self.summarize(evicted).await;
        WindowOutcome::Summarized {
            trajectories: count,
            steps,
        }
    }

    async fn summarize(&mut self, evicted: Vec<Trajectory>) {
        let fold = self
            .config
            .max_summaries
            .is_some_and(|cap| self.summaries.len() >= cap);
        let previous = if fold { self.summaries.pop() } else { None };
        let previous_digest = previous.as_ref().map(|s| s.digest.as_str());

        let digest = match self.summarizer.summarize(&evicted, previous_digest).await {
            Ok(digest) => digest,
            Err(e) => {
                tracing::warn!("summarizer failed, using digest fallback: {}", e);
                DigestSummarizer::digest(&evicted, previous_digest)
            }
        };

        let mut summary = ConversationSummary::from_batch(&evicted, digest);
        if let Some(older) = previous {
            summary = summary.absorb(older);
        }
        self.summaries.push(summary);
    }

    /// Summaries first, then active trajectories; no side effects
    pub fn context_view(&self) -> ContextView<'_> {
        ContextView {
            summaries: &self.summaries,
            trajectories: &self.active,
        }
    }

    /// Forget trajectories and summaries; counters are kept
    pub fn clear(&mut self) {
        self.active.clear();
        self.summaries.clear();
    }
}

impl std::fmt::Debug for ConversationHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationHistory")
            .field("config", &self.config)
            .field("active", &self.active.len())
            .field("summaries", &self.summaries.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::{Thought, ToolInvocation, ToolObservation};
    use async_trait::async_trait;
    use serde_json::json;

    fn finished(request: &str, tool: &str) -> Trajectory {
        let mut t = Trajectory::new(request, "all");
        t.append(
            Thought::new("act"),
            ToolInvocation::call(tool, json!({})),
            Some(ToolObservation::success(json!("ok"))),
        )
        .unwrap();
        t.append(Thought::new("done"), ToolInvocation::Finish, None)
            .unwrap();
        t
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _batch: &[Trajectory], _previous: Option<&str>) -> Result<String> {
            Err(Error::Synthesis("model unavailable".into()))
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ConversationHistoryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_trajectories, 10);
        assert_eq!(config.max_summaries, Some(1));
    }

    #[test]
    fn test_overlapping_preserve_is_rejected() {
        let err = ConversationHistory::with_digest(ConversationHistoryConfig::new(3, 2, 2)).unwrap_err();
        assert!(matches!(
            err,
            Error::WindowConfiguration {
                max_trajectories: 3,
                preserve_first: 2,
                preserve_last: 2
            }
        ));
        assert!(ConversationHistoryConfig::new(4, 2, 2).validate().is_ok());
        assert!(
            ConversationHistoryConfig::default()
                .with_max_summaries(Some(0))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: ConversationHistoryConfig =
            serde_json::from_value(json!({"max_trajectories": 5, "max_summaries": null})).unwrap();
        assert_eq!(config.max_trajectories, 5);
        assert_eq!(config.preserve_last, 3);
        assert_eq!(config.max_summaries, None);
    }

    #[tokio::test]
    async fn test_unlimited_summaries_append_in_eviction_order() {
        let config = ConversationHistoryConfig::new(2, 1, 1).with_max_summaries(None);
        let mut history = ConversationHistory::with_digest(config).unwrap();
        for i in 1..=4 {
            history.add(finished(&format!("q{}", i), "get_weather")).await;
        }
        let requests: Vec<&str> = history.active().iter().map(|t| t.request.as_str()).collect();
        assert_eq!(requests, vec!["q1", "q4"]);
        assert_eq!(history.summaries().len(), 2);
        assert_eq!(history.summaries()[0].digest, "- q2 => finished after 2 steps");
        assert_eq!(history.summaries()[1].digest, "- q3 => finished after 2 steps");
    }

    #[tokio::test]
    async fn test_drop_without_summary_counts() {
        let config = ConversationHistoryConfig::new(1, 0, 1).with_summarize_removed(false);
        let mut history = ConversationHistory::with_digest(config).unwrap();
        assert_eq!(history.add(finished("a", "x")).await, WindowOutcome::Retained);
        assert_eq!(
            history.add(finished("b", "x")).await,
            WindowOutcome::Dropped {
                trajectories: 1,
                steps: 2
            }
        );
        assert!(history.summaries().is_empty());
        assert_eq!(
            history.stats(),
            HistoryStats {
                trajectories_added: 2,
                trajectories_evicted: 1,
                trajectories_dropped: 1,
                steps_dropped: 2
            }
        );
    }

    #[tokio::test]
    async fn test_summarizer_failure_degrades_to_digest() {
        let mut history =
            ConversationHistory::new(ConversationHistoryConfig::new(1, 0, 0), Arc::new(FailingSummarizer))
                .unwrap();
        history.add(finished("first", "get_weather")).await;
        let outcome = history.add(finished("second", "search_events")).await;
        assert_eq!(
            outcome,
            WindowOutcome::Summarized {
                trajectories: 1,
                steps: 2
            }
        );
        assert_eq!(history.summaries()[0].digest, "- first => finished after 2 steps");
        assert_eq!(history.active()[0].request, "second");
    }

    #[tokio::test]
    async fn test_render_lists_summaries_then_exchanges() {
        let mut history = ConversationHistory::with_digest(ConversationHistoryConfig::new(1, 0, 1)).unwrap();
        let mut first = finished("weather in Paris?", "get_weather");
        first.set_metadata("answer", json!("Sunny."));
        let mut second = finished("events in Paris?", "search_events");
        second.set_metadata("answer", json!("A jazz night."));
        history.add(first).await;
        history.add(second).await;

        let text = history.context_view().render();
        let summary_at = text.find("[Summary of 1 earlier exchanges, 2 steps, capabilities: get_weather]").unwrap();
        let exchange_at = text.find("[Exchange 1] User: events in Paris?").unwrap();
        assert!(summary_at < exchange_at);
        assert!(text.contains("- weather in Paris? => Sunny."));
        assert!(text.contains("Assistant: A jazz night."));
    }

    #[tokio::test]
    async fn test_incomplete_trajectories_are_not_added() {
        let mut history = ConversationHistory::with_digest(ConversationHistoryConfig::new(1, 0, 0)).unwrap();
        history.add(finished("kept", "x")).await;

        let running = Trajectory::new("still going", "all");
        assert_eq!(history.add(running).await, WindowOutcome::Rejected);

        let mut failed = Trajectory::new("broke", "all");
        failed.fail("no usable action").unwrap();
        assert_eq!(history.add(failed).await, WindowOutcome::Rejected);

        assert_eq!(history.active()[0].request, "kept");
        assert!(history.summaries().is_empty());
        assert_eq!(history.stats().trajectories_added, 1);
    }

    #[tokio::test]
    async fn test_clear_keeps_stats() {
        let mut history = ConversationHistory::with_digest(ConversationHistoryConfig::new(1, 0, 0)).unwrap();
        history.add(finished("a", "x")).await;
        history.add(finished("b", "x")).await;
        history.clear();
        assert!(history.context_view().is_empty());
        assert_eq!(history.stats().trajectories_added, 2);
        assert_eq!(history.context_view().render(), "");
    }
}
