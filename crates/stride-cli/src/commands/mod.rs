//! Slash commands for interactive mode

mod history;
mod session;
mod set;

pub use history::HistoryCommand;
pub use session::SessionCommand;
pub use set::SetCommand;

use stride_agent::{Agent, CapabilitySet};

/// Result of executing a slash command
pub enum CommandResult {
    /// Clear the conversation history
    Clear,
    /// Switch to another capability set
    ChangeCapabilitySet(CapabilitySet),
    /// Set or unset the session user
    ChangeUser(Option<String>),
    /// Show a message to the user (not sent to agent)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, agent: &Agent) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next().unwrap_or_default().to_lowercase();
    let args = parts.next().map(str::trim).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "clear" | "c" => CommandResult::Clear,

        "quit" | "exit" | "q" => CommandResult::Exit,

        "history" => HistoryCommand::execute(agent),

        "session" | "s" => SessionCommand::execute(agent),

        "set" => SetCommand::execute(args, agent.capability_set()),

        "user" | "u" => {
            if args.is_empty() {
                CommandResult::ChangeUser(None)
            } else {
                CommandResult::ChangeUser(Some(args.to_string()))
            }
        }

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /history             Show the conversation context the reasoner sees
  /session, /s         Show conversation and window statistics
  /set [name]          List capability sets or switch to one
  /user, /u [id]       Set the session user (no id clears it)
  /clear, /c           Clear conversation history
  /quit, /exit, /q     Exit stride

Examples:
  /set weather         Only offer the weather capability
  /user alice          Let cart capabilities act for alice
  /clear               Start fresh conversation"#
        .to_string()
}
