//! stride-ai: chat-completion provider layer
//!
//! This crate provides the message types and a provider trait used by the
//! reasoning and synthesis steps of the stride agent, plus an
//! OpenAI-compatible implementation.

pub mod error;
pub mod providers;
pub mod types;

pub use error::{Error, Result};
pub use providers::ChatProvider;
pub use types::*;
