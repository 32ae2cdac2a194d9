//! /set command - show and switch capability sets

use super::CommandResult;
use crate::tools::{SET_NAMES, capability_set};
use stride_agent::CapabilitySet;

pub struct SetCommand;

impl SetCommand {
    pub fn execute(args: &str, current: &CapabilitySet) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message(show_sets(current));
        }
        match capability_set(&args.to_lowercase()) {
            Some(set) => CommandResult::ChangeCapabilitySet(set),
            None => CommandResult::Message(format!(
                "Unknown capability set: '{}'\nValid sets: {}",
                args,
                SET_NAMES.join(", ")
            )),
        }
    }
}

fn show_sets(current: &CapabilitySet) -> String {
    let sets = [
        ("weather", "Current conditions by city"),
        ("events", "Local events, plus weather"),
        ("shopping", "Cart for the session user"),
        ("all", "Every capability"),
    ];

    let mut output = String::from("Capability sets:\n\n");
    for (name, desc) in sets {
        let marker = if name == current.name { " *" } else { "" };
        output.push_str(&format!("  {:<10} {}{}\n", name, desc, marker));
    }
    output.push_str("\nSwitch with: /set <name>");
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_sets_with_marker() {
        let current = capability_set("events").unwrap();
        match SetCommand::execute("", &current) {
            CommandResult::Message(text) => {
                assert!(text.contains("events     Local events, plus weather *"));
                assert!(!text.contains("Every capability *"));
            }
            _ => panic!("expected listing"),
        }
    }

    #[test]
    fn test_switch_and_reject() {
        let current = CapabilitySet::new("all");
        match SetCommand::execute("Weather", &current) {
            CommandResult::ChangeCapabilitySet(set) => assert_eq!(set.name, "weather"),
            _ => panic!("expected switch"),
        }
        match SetCommand::execute("teleport", &current) {
            CommandResult::Message(text) => assert!(text.contains("Valid sets")),
            _ => panic!("expected error message"),
        }
    }
}
