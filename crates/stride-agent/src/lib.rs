//! stride-agent: reason-act-observe loop with bounded conversation memory
//!
//! This crate provides the loop controller that drives a reasoner and a
//! tool dispatcher over an append-only trajectory, answer synthesis, and a
//! conversation history that windows and summarizes finished trajectories.

pub mod agent;
pub mod capability;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod fallback;
pub mod history;
pub mod reasoning;
pub mod synthesis;
pub mod trajectory;

pub use agent::{Agent, AgentConfig, QueryResult};
pub use capability::{
    BoxedCapability, Capability, CapabilityDescriptor, CapabilityRegistry, CapabilitySet,
    SessionContext,
};
pub use controller::{LoopBudget, LoopController, LoopOutcome, LoopState};
pub use dispatcher::{Dispatch, ToolDispatcher};
pub use error::{Error, Result};
pub use events::AgentEvent;
pub use fallback::{FallbackPolicy, FallbackRule, FinishAfterObservationRule, KeywordRule};
pub use history::{
    ContextView, ConversationHistory, ConversationHistoryConfig, ConversationSummary,
    HistoryStats, WindowOutcome,
};
pub use reasoning::{LlmReasoner, Proposal, Reasoner, parse_proposal};
pub use synthesis::{DigestSummarizer, LlmSynthesizer, Summarizer, Synthesis, Synthesizer};
pub use trajectory::{
    BudgetLimit, ObservationStatus, Termination, Thought, ToolInvocation, ToolObservation,
    Trajectory, TrajectoryStep,
};
