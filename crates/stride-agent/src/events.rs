//! Agent event types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::controller::LoopState;
use crate::trajectory::ObservationStatus;

/// Events emitted while a query runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A query started
    QueryStart {
        conversation_id: Uuid,
        turn: u32,
        request: String,
    },

    /// The controller is about to ask the reasoner for step `index`
    StepStart { index: u32 },

    /// The thought chosen for step `index`
    Thought {
        index: u32,
        text: String,
        confidence: Option<f32>,
    },

    /// Reasoning output was unusable and a fallback rule chose the action
    FallbackApplied {
        index: u32,
        rule: String,
        invocation: String,
    },

    /// Capability dispatch started
    ToolExecutionStart {
        index: u32,
        capability: String,
        arguments: serde_json::Value,
    },

    /// Capability dispatch completed
    ToolExecutionEnd {
        index: u32,
        capability: String,
        status: ObservationStatus,
        duration_ms: u64,
    },

    /// The loop reached a terminal state
    LoopTerminated { state: LoopState, steps: u32 },

    /// Evicted trajectories were folded into a summary
    SummaryCreated { trajectories: usize, steps: usize },

    /// Evicted trajectories were discarded without a summary
    TrajectoriesDropped { trajectories: usize, steps: usize },

    /// Query finished
    QueryEnd { success: bool, elapsed_ms: u64 },
}

impl AgentEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::QueryEnd { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_tagged_snake_case() {
        let event = AgentEvent::LoopTerminated {
            state: LoopState::TerminatedBudget,
            steps: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "loop_terminated");
        assert_eq!(json["state"], "terminated_budget");

        let back: AgentEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_only_query_end_is_terminal() {
        assert!(AgentEvent::QueryEnd {
            success: false,
            elapsed_ms: 3
        }
        .is_terminal());
        assert!(!AgentEvent::StepStart { index: 1 }.is_terminal());
    }
}
