//! /session command - show conversation info and window stats

use super::CommandResult;
use stride_agent::Agent;

pub struct SessionCommand;

impl SessionCommand {
    pub fn execute(agent: &Agent) -> CommandResult {
        let history = agent.history();
        let config = history.config();
        let stats = history.stats();

        let mut output = String::from("Session Info\n");
        output.push_str(&"-".repeat(40));
        output.push('\n');

        output.push_str(&format!("Conversation: {}\n", agent.conversation_id()));
        output.push_str(&format!("Turns:        {}\n", agent.turn()));
        output.push_str(&format!("Capabilities: {}\n", agent.capability_set().name));
        output.push_str(&format!(
            "User:         {}\n",
            agent
                .session_context()
                .and_then(|s| s.get("user_id"))
                .unwrap_or("(none)")
        ));
        output.push('\n');

        output.push_str(&format!(
            "Window:       {} of {} exchanges ({} first / {} last preserved)\n",
            history.len(),
            config.max_trajectories,
            config.preserve_first,
            config.preserve_last
        ));
        output.push_str(&format!("Summaries:    {}\n", history.summaries().len()));
        output.push_str(&format!(
            "Evicted:      {} ({} dropped, {} steps lost)\n",
            stats.trajectories_evicted, stats.trajectories_dropped, stats.steps_dropped
        ));

        CommandResult::Message(output)
    }
}
