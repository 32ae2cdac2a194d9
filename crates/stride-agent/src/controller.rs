//! Loop controller: the reason, act, observe state machine
//!
//! ```text
//! REASONING --finish--------------> TERMINATED_FINISH
//! REASONING --call----------------> DISPATCHING --observation--> REASONING
//! REASONING --unusable, no rule---> TERMINATED_ERROR
//! (budget check before REASONING) -> TERMINATED_BUDGET
//! ```
//!
//! Every await is sequential: the reasoner call completes before dispatch
//! starts, and dispatch completes before the next budget check. Failures
//! inside the loop never escape [`LoopController::run`]; they end up in the
//! returned [`LoopOutcome`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::capability::{CapabilityRegistry, CapabilitySet, SessionContext};
use crate::dispatcher::Dispatch;
use crate::error::Error;
use crate::events::AgentEvent;
use crate::reasoning::{Proposal, Reasoner};
use crate::trajectory::{BudgetLimit, Thought, ToolInvocation, Trajectory};

/// Controller states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Reasoning,
    Dispatching,
    TerminatedFinish,
    TerminatedBudget,
    TerminatedError,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoopState::TerminatedFinish | LoopState::TerminatedBudget | LoopState::TerminatedError
        )
    }
}

/// Limits checked at every step boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopBudget {
    pub max_iterations: u32,
    pub max_duration: Duration,
}

impl Default for LoopBudget {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            max_duration: Duration::from_secs(120),
        }
    }
}

/// Result of one loop run
#[derive(Debug)]
pub struct LoopOutcome {
    pub trajectory: Trajectory,
    /// Always a terminal state
    pub state: LoopState,
    /// Cause when `state` is `TerminatedError`
    pub error: Option<Error>,
    pub elapsed: Duration,
}

/// Drives one trajectory from request to termination
pub struct LoopController {
    registry: Arc<CapabilityRegistry>,
    reasoner: Arc<dyn Reasoner>,
    dispatcher: Arc<dyn Dispatch>,
    event_tx: Option<broadcast::Sender<AgentEvent>>,
}

impl LoopController {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        reasoner: Arc<dyn Reasoner>,
        dispatcher: Arc<dyn Dispatch>,
    ) -> Self {
        Self {
            registry,
            reasoner,
            dispatcher,
            event_tx: None,
        }
    }

    /// Publish loop events on this channel
    pub fn with_events(mut self, event_tx: broadcast::Sender<AgentEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Run the loop for `request` until finish, budget exhaustion, or a
    /// reasoning failure.
    pub async fn run(
        &self,
        request: &str,
        capability_set: &CapabilitySet,
        session: Option<&SessionContext>,
        conversation: &str,
        budget: LoopBudget,
    ) -> LoopOutcome {
        let started = Instant::now();
        let mut trajectory = Trajectory::new(request, capability_set.name.clone());
        let descriptors = capability_set.descriptors(&self.registry);
        let mut error = None;
        let mut current = LoopState::Reasoning;

        tracing::info!(
            trajectory = %trajectory.id,
            capability_set = %capability_set.name,
            max_iterations = budget.max_iterations,
            "loop started"
        );

        let state = loop {
            if let Some(limit) = budget_exceeded(&trajectory, started, budget) {
                tracing::info!(steps = trajectory.iteration_count(), ?limit, "budget exhausted");
                if let Err(e) = trajectory.terminate_budget(limit) {
                    error = Some(e);
                    break LoopState::TerminatedError;
                }
                break LoopState::TerminatedBudget;
            }

            let index = trajectory.iteration_count() + 1;
            self.emit(AgentEvent::StepStart { index });
            let proposal = match self
                .reasoner
                .propose(&trajectory, &descriptors, conversation)
                .await
            {
                Ok(p) => p,
                Err(e) if e.is_configuration() => {
                    tracing::warn!(step = index, "reasoner is misconfigured: {}", e);
                    let _ = trajectory.fail(e.to_string());
                    error = Some(e);
                    break LoopState::TerminatedError;
                }
                Err(e) => {
                    tracing::warn!(step = index, "reasoner call failed: {}", e);
                    Proposal::unusable(format!("Reasoning call failed: {}", e))
                }
            };

            let (thought, invocation) = match proposal.invocation {
                Some(invocation) => (proposal.thought, invocation),
                None => match capability_set.fallback.resolve(request, &trajectory) {
                    Some((rule, invocation)) => {
                        tracing::warn!(step = index, rule = %rule, "unusable reasoning output, applying fallback");
                        self.emit(AgentEvent::FallbackApplied {
                            index,
                            rule: rule.clone(),
                            invocation: invocation.name().to_string(),
                        });
                        let text = if proposal.thought.text.is_empty() {
                            format!("Fallback rule '{}' chose the next action", rule)
                        } else {
                            proposal.thought.text.clone()
                        };
                        (Thought::new(text), invocation)
                    }
                    None => {
                        let failure = Error::Reasoning(format!(
                            "no usable action at step {} and no fallback rule matched",
                            index
                        ));
                        tracing::warn!("{}", failure);
                        let _ = trajectory.fail(failure.to_string());
                        error = Some(failure);
                        break LoopState::TerminatedError;
                    }
                },
            };

            tracing::debug!(step = index, action = invocation.name(), "thought: {}", thought.text);
            self.emit(AgentEvent::Thought {
                index,
                text: thought.text.clone(),
                confidence: thought.confidence,
            });

            let (name, args) = match &invocation {
                ToolInvocation::Finish => {
                    match trajectory.append(thought, ToolInvocation::Finish, None) {
                        Ok(_) => break LoopState::TerminatedFinish,
                        Err(e) => {
                            error = Some(e);
                            break LoopState::TerminatedError;
                        }
                    }
                }
                ToolInvocation::Call { name, args } => (name.clone(), args.clone()),
            };

            transition(&mut current, LoopState::Dispatching);
            self.emit(AgentEvent::ToolExecutionStart {
                index,
                capability: name.clone(),
                arguments: serde_json::Value::Object(args.clone()),
            });
            let dispatch_started = Instant::now();
            let observation = self.dispatcher.execute(&name, &args, session).await;
            self.emit(AgentEvent::ToolExecutionEnd {
                index,
                capability: name,
                status: observation.status(),
                duration_ms: dispatch_started.elapsed().as_millis() as u64,
            });

            if let Err(e) = trajectory.append(thought, invocation, Some(observation)) {
                error = Some(e);
                break LoopState::TerminatedError;
            }
            transition(&mut current, LoopState::Reasoning);
        };

        let elapsed = started.elapsed();
        tracing::info!(
            trajectory = %trajectory.id,
            state = ?state,
            steps = trajectory.iteration_count(),
            elapsed_ms = elapsed.as_millis() as u64,
            "loop terminated"
        );
        self.emit(AgentEvent::LoopTerminated {
            state,
            steps: trajectory.iteration_count(),
        });

        LoopOutcome {
            trajectory,
            state,
            error,
            elapsed,
        }
    }
}

fn transition(state: &mut LoopState, next: LoopState) {
    tracing::trace!(from = ?*state, to = ?next, "state transition");
    *state = next;
}

fn budget_exceeded(trajectory: &Trajectory, started: Instant, budget: LoopBudget) -> Option<BudgetLimit> {
    if trajectory.iteration_count() >= budget.max_iterations {
        return Some(BudgetLimit::Iterations {
            max: budget.max_iterations,
        });
    }
    if started.elapsed() >= budget.max_duration {
        return Some(BudgetLimit::Duration {
            max_ms: budget.max_duration.as_millis() as u64,
        });
    }
    None
}
