//! Agent: one conversation session
//!
//! Ties the loop controller, the synthesizer, and a bounded conversation
//! history together behind [`Agent::query`], which always returns a
//! [`QueryResult`].

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    capability::{CapabilityRegistry, CapabilitySet, SessionContext},
    controller::{LoopBudget, LoopController, LoopState},
    dispatcher::{DEFAULT_TOOL_TIMEOUT, Dispatch, ToolDispatcher},
    error::Result,
    events::AgentEvent,
    history::{ConversationHistory, ConversationHistoryConfig, WindowOutcome},
    reasoning::Reasoner,
    synthesis::{BUDGET_CONFIDENCE_CAP, Summarizer, Synthesis, Synthesizer},
    trajectory::{Trajectory, truncate},
};

/// Confidence ceiling when the synthesizer failed and the answer was built locally
const DEGRADED_CONFIDENCE: f32 = 0.3;

/// Agent configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Steps per query before the loop is halted
    pub max_iterations: u32,
    /// Wall-clock budget per query, checked at step boundaries
    pub max_duration: Duration,
    /// Per-call capability deadline
    pub tool_timeout: Duration,
    /// Conversation window
    pub history: ConversationHistoryConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            max_duration: Duration::from_secs(120),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            history: ConversationHistoryConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    pub fn with_tool_timeout(mut self, tool_timeout: Duration) -> Self {
        self.tool_timeout = tool_timeout;
        self
    }

    pub fn with_history(mut self, history: ConversationHistoryConfig) -> Self {
        self.history = history;
        self
    }

    fn budget(&self) -> LoopBudget {
        LoopBudget {
            max_iterations: self.max_iterations,
            max_duration: self.max_duration,
        }
    }
}

/// Structured result of one query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub success: bool,
    pub answer: String,
    pub rationale: String,
    pub confidence: f32,
    pub trajectory: Trajectory,
    pub elapsed: Duration,
    pub iteration_count: u32,
    pub capabilities_used: Vec<String>,
    /// The loop was halted by a budget rather than finishing
    pub budget_limited: bool,
    pub state: LoopState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One conversation session
pub struct Agent {
    config: AgentConfig,
    registry: Arc<CapabilityRegistry>,
    reasoner: Arc<dyn Reasoner>,
    dispatcher: Arc<dyn Dispatch>,
    synthesizer: Arc<dyn Synthesizer>,
    capability_set: CapabilitySet,
    session: Option<SessionContext>,
    history: ConversationHistory,
    event_tx: broadcast::Sender<AgentEvent>,
    conversation_id: Uuid,
    turn: u32,
}

impl Agent {
    /// Create a new agent. Fails on an invalid history window.
    pub fn new(
        config: AgentConfig,
        registry: Arc<CapabilityRegistry>,
        reasoner: Arc<dyn Reasoner>,
        synthesizer: Arc<dyn Synthesizer>,
        summarizer: Arc<dyn Summarizer>,
        capability_set: CapabilitySet,
    ) -> Result<Self> {
        let history = ConversationHistory::new(config.history.clone(), summarizer)?;
        let dispatcher =
            Arc::new(ToolDispatcher::new(registry.clone()).with_timeout(config.tool_timeout));
        let (event_tx, _) = broadcast::channel(256);
        Ok(Self {
            config,
            registry,
            reasoner,
            dispatcher,
            synthesizer,
            capability_set,
            session: None,
            history,
            event_tx,
            conversation_id: Uuid::new_v4(),
            turn: 0,
        })
    }

    /// Attach the session context handed to context-aware capabilities
    pub fn with_session_context(mut self, session: SessionContext) -> Self {
        self.session = Some(session);
        self
    }

    /// Replace the registry-backed dispatcher
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatch>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Subscribe to agent events
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn capability_set(&self) -> &CapabilitySet {
        &self.capability_set
    }

    pub fn session_context(&self) -> Option<&SessionContext> {
        self.session.as_ref()
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Queries run so far
    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// Switch capability sets between queries
    pub fn set_capability_set(&mut self, capability_set: CapabilitySet) {
        self.capability_set = capability_set;
    }

    pub fn set_session_context(&mut self, session: Option<SessionContext>) {
        self.session = session;
    }

    /// Drop remembered trajectories and summaries
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    fn emit(&self, event: AgentEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Run one request through the loop, synthesize an answer, and record
    /// the trajectory in the conversation history.
    pub async fn query(&mut self, request: &str) -> QueryResult {
        let started = Instant::now();
        self.turn += 1;
        self.emit(AgentEvent::QueryStart {
            conversation_id: self.conversation_id,
            turn: self.turn,
            request: request.to_string(),
        });
        tracing::info!(conversation = %self.conversation_id, turn = self.turn, "query: {}", truncate(request, 200));

        let conversation = self.history.context_view().render();
        let controller = LoopController::new(
            self.registry.clone(),
            self.reasoner.clone(),
            self.dispatcher.clone(),
        )
        .with_events(self.event_tx.clone());
        let outcome = controller
            .run(
                request,
                &self.capability_set,
                self.session.as_ref(),
                &conversation,
                self.config.budget(),
            )
            .await;

        let mut trajectory = outcome.trajectory;
        trajectory.set_metadata("conversation_id", json!(self.conversation_id));
        trajectory.set_metadata("turn", json!(self.turn));

        if outcome.state == LoopState::TerminatedError {
            let error = outcome
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Reasoning failure".to_string());
            return self.finish(started, trajectory, outcome.state, None, Some(error));
        }

        let budget_limited = trajectory.is_budget_limited();
        let synthesis = match self.synthesizer.synthesize(&trajectory).await {
            Ok(s) if !s.answer.trim().is_empty() => {
                if budget_limited {
                    s.capped(BUDGET_CONFIDENCE_CAP)
                } else {
                    s
                }
            }
            Ok(_) => {
                tracing::warn!("synthesizer returned an empty answer, degrading");
                degraded_answer(&trajectory)
            }
            Err(e) => {
                tracing::warn!("synthesis failed, degrading: {}", e);
                degraded_answer(&trajectory)
            }
        };
        trajectory.set_metadata("answer", Value::String(synthesis.answer.clone()));
        trajectory.set_metadata("confidence", json!(synthesis.confidence));

        match self.history.add(trajectory.clone()).await {
            WindowOutcome::Retained | WindowOutcome::Rejected => {}
            WindowOutcome::Summarized {
                trajectories,
                steps,
            } => self.emit(AgentEvent::SummaryCreated {
                trajectories,
                steps,
            }),
            WindowOutcome::Dropped {
                trajectories,
                steps,
            } => self.emit(AgentEvent::TrajectoriesDropped {
                trajectories,
                steps,
            }),
        }

        self.finish(started, trajectory, outcome.state, Some(synthesis), None)
    }

    fn finish(
        &self,
        started: Instant,
        trajectory: Trajectory,
        state: LoopState,
        synthesis: Option<Synthesis>,
        error: Option<String>,
    ) -> QueryResult {
        let elapsed = started.elapsed();
        let success = synthesis.is_some();
        let Synthesis {
            answer,
            rationale,
            confidence,
        } = synthesis.unwrap_or_else(|| Synthesis::new("", "", 0.0));

        self.emit(AgentEvent::QueryEnd {
            success,
            elapsed_ms: elapsed.as_millis() as u64,
        });
        if let Some(e) = &error {
            tracing::warn!(turn = self.turn, "query failed: {}", e);
        } else {
            tracing::info!(
                turn = self.turn,
                steps = trajectory.iteration_count(),
                confidence,
                "query answered"
            );
        }

        QueryResult {
            success,
            answer,
            rationale,
            confidence,
            iteration_count: trajectory.iteration_count(),
            capabilities_used: trajectory.capabilities_used(),
            budget_limited: trajectory.is_budget_limited(),
            trajectory,
            elapsed,
            state,
            error,
        }
    }
}

/// Local answer when the synthesizer could not produce one
fn degraded_answer(trajectory: &Trajectory) -> Synthesis {
    match trajectory.last_success() {
        Some(value) => {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Synthesis::new(
                truncate(&text, 2000),
                "Answer synthesis was unavailable; this is the most recent capability result.",
                DEGRADED_CONFIDENCE,
            )
        }
        None => Synthesis::new(
            format!(
                "I could not produce a complete answer to \"{}\" after {} steps.",
                truncate(&trajectory.request, 200),
                trajectory.iteration_count()
            ),
            "No capability returned a usable result.",
            0.1,
        ),
    }
}
