//! Observability events emitted by a run.
//!
//! Uses an unbounded tokio channel so the attempt loop never waits on the
//! consumer. The loop sends, the recorder task logs and persists.

use chrono::{DateTime, Local};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::automation::state::LoopState;

/// Whether an attempt ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Continue,
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptOutcome::Success => write!(f, "success"),
            AttemptOutcome::Continue => write!(f, "continue"),
        }
    }
}

/// Record of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptResult {
    /// Attempt number (1-based)
    pub attempt: u64,
    pub recognized_text: Vec<String>,
    pub matched_required_all: bool,
    pub matched_required_any: bool,
    pub matched_forbidden: bool,
    pub pixel_passed: bool,
    /// Success carried no information: no word list and no pixel check
    pub unconditional: bool,
    /// Set when capture or OCR failed; the attempt counts as no match
    pub recognition_error: Option<String>,
    pub outcome: AttemptOutcome,
    pub captured_at: DateTime<Local>,
}

impl AttemptResult {
    /// Recognized lines joined with spaces, cut to `max_chars`.
    pub fn text_preview(&self, max_chars: usize) -> String {
        let joined = self.recognized_text.join(" ");
        if joined.chars().count() <= max_chars {
            joined
        } else {
            let cut: String = joined.chars().take(max_chars).collect();
            format!("{}...", cut)
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Terminal state
    pub state: LoopState,
    /// Attempts fully evaluated
    pub attempts: u64,
    pub elapsed: Duration,
}

/// Event stream of one run, in order: Started, Attempt*, Finished.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started {
        started_at: DateTime<Local>,
        /// 0 = unlimited
        max_attempts: u64,
        steps: usize,
    },
    Attempt(AttemptResult),
    Finished(RunReport),
}

/// Creates the event channel.
///
/// Returns a tuple of (sender, receiver):
/// - The sender is cloned into every run
/// - The receiver is consumed by the recorder task
pub fn create_event_channel() -> (UnboundedSender<RunEvent>, UnboundedReceiver<RunEvent>) {
    unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with_text(lines: &[&str]) -> AttemptResult {
        AttemptResult {
            attempt: 1,
            recognized_text: lines.iter().map(|s| s.to_string()).collect(),
            matched_required_all: true,
            matched_required_any: true,
            matched_forbidden: false,
            pixel_passed: true,
            unconditional: false,
            recognition_error: None,
            outcome: AttemptOutcome::Continue,
            captured_at: Local::now(),
        }
    }

    #[test]
    fn test_text_preview_truncates() {
        let result = result_with_text(&["Ring of", "Agility"]);
        assert_eq!(result.text_preview(80), "Ring of Agility");
        assert_eq!(result.text_preview(4), "Ring...");
    }

    #[tokio::test]
    async fn test_channel_closes_when_sender_dropped() {
        let (sender, mut receiver) = create_event_channel();
        sender
            .send(RunEvent::Attempt(result_with_text(&["x"])))
            .unwrap();
        drop(sender);

        assert!(matches!(receiver.recv().await, Some(RunEvent::Attempt(_))));
        assert!(receiver.recv().await.is_none());
    }
}
