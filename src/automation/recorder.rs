//! Recorder task for run events.
//!
//! Consumes the event channel, logs every attempt and writes a CSV per run
//! into its own timestamped session folder.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

use tokio::sync::mpsc::UnboundedReceiver;

use crate::automation::csv_writer::{append_attempt, init_csv};
use crate::automation::report::{AttemptOutcome, AttemptResult, RunEvent};

/// Creates `<output_dir>/<YYYYMMDD_HHMMSS>/attempts.csv` and returns its path.
///
/// A second run in the same second gets `<YYYYMMDD_HHMMSS>_2`, then `_3`...
fn open_session(output_dir: &Path, started_at: &DateTime<Local>) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let stamp = started_at.format("%Y%m%d_%H%M%S").to_string();

    let mut suffix = 1u32;
    let session_dir = loop {
        let name = if suffix == 1 {
            stamp.clone()
        } else {
            format!("{}_{}", stamp, suffix)
        };
        let candidate = output_dir.join(name);
        match std::fs::create_dir(&candidate) {
            Ok(()) => break candidate,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(e.into()),
        }
    };

    let csv_path = session_dir.join("attempts.csv");
    init_csv(&csv_path)?;
    Ok(csv_path)
}

fn log_attempt(result: &AttemptResult) {
    if let Some(error) = &result.recognition_error {
        tracing::warn!("Attempt {}: recognizer failed: {}", result.attempt, error);
        return;
    }

    let text = result.text_preview(80);
    match result.outcome {
        AttemptOutcome::Success if result.unconditional => tracing::warn!(
            "Attempt {}: MATCH (unconditional, nothing configured to check) '{}'",
            result.attempt,
            text
        ),
        AttemptOutcome::Success => {
            tracing::info!("Attempt {}: MATCH '{}'", result.attempt, text)
        }
        AttemptOutcome::Continue => tracing::info!(
            "Attempt {}: no match (all={} any={} forbidden={} pixel={}) '{}'",
            result.attempt,
            result.matched_required_all,
            result.matched_required_any,
            result.matched_forbidden,
            result.pixel_passed,
            text
        ),
    }
}

/// Runs the recorder loop.
///
/// Processes events until the channel is closed (every sender dropped).
/// CSV failures are logged and never stop the recorder.
pub async fn run_recorder(mut receiver: UnboundedReceiver<RunEvent>, output_dir: PathBuf) {
    tracing::debug!("Recorder started");
    let mut csv_path: Option<PathBuf> = None;

    while let Some(event) = receiver.recv().await {
        match event {
            RunEvent::Started {
                started_at,
                max_attempts,
                steps,
            } => {
                let budget = if max_attempts == 0 {
                    "unlimited".to_string()
                } else {
                    max_attempts.to_string()
                };
                tracing::info!(
                    "Run started: {} click step(s), max attempts {}",
                    steps,
                    budget
                );

                csv_path = match open_session(&output_dir, &started_at) {
                    Ok(path) => {
                        tracing::info!("Recording attempts to {}", path.display());
                        Some(path)
                    }
                    Err(e) => {
                        tracing::error!("Failed to create session CSV: {:#}", e);
                        None
                    }
                };
            }
            RunEvent::Attempt(result) => {
                log_attempt(&result);
                if let Some(path) = &csv_path {
                    if let Err(e) = append_attempt(path, &result) {
                        tracing::error!(
                            "Failed to write CSV for attempt {}: {:#}",
                            result.attempt,
                            e
                        );
                    }
                }
            }
            RunEvent::Finished(report) => {
                tracing::info!(
                    "Run finished: {} after {} attempt(s) in {:.1}s",
                    report.state,
                    report.attempts,
                    report.elapsed.as_secs_f64()
                );
                csv_path = None;
            }
        }
    }

    tracing::debug!("Recorder: channel closed, exiting");
}
