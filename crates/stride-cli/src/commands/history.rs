//! /history command - show the rendered conversation context

use super::CommandResult;
use stride_agent::Agent;

pub struct HistoryCommand;

impl HistoryCommand {
    pub fn execute(agent: &Agent) -> CommandResult {
        let view = agent.history().context_view();
        if view.is_empty() {
            return CommandResult::Message("No conversation history yet.".to_string());
        }
        CommandResult::Message(view.render())
    }
}
