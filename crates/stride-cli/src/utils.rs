//! Shared utilities

use stride_agent::{AgentEvent, ObservationStatus};
use tokio::sync::broadcast::{Receiver, error::RecvError};

/// Truncate a string to `max` characters, appending "..." if truncated.
/// Operates on Unicode char boundaries, not bytes.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

/// Format an observation status for display.
pub fn status_str(status: ObservationStatus) -> &'static str {
    match status {
        ObservationStatus::Success => "ok",
        ObservationStatus::Error => "failed",
        ObservationStatus::Timeout => "timed out",
        ObservationStatus::NotExecuted => "skipped",
    }
}

/// Next event from the agent; lagging drops the missed events and keeps
/// reading. `None` once the agent is gone.
pub async fn next_event(receiver: &mut Receiver<AgentEvent>) -> Option<AgentEvent> {
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Progress printer fell behind");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast;

    #[tokio::test]
    async fn test_next_event_keeps_reading_after_lag() {
        let (sender, mut receiver) = broadcast::channel(2);
        for index in 0..6 {
            sender.send(AgentEvent::StepStart { index }).unwrap();
        }

        match next_event(&mut receiver).await {
            Some(AgentEvent::StepStart { index }) => assert_eq!(index, 4),
            other => panic!("expected a step event, got {:?}", other),
        }
        assert!(matches!(
            next_event(&mut receiver).await,
            Some(AgentEvent::StepStart { index: 5 })
        ));

        drop(sender);
        assert!(next_event(&mut receiver).await.is_none());
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
