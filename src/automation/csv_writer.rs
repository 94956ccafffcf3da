//! CSV writer for attempt results.
//!
//! Writes one row per attempt in append-only mode for crash safety.

use crate::automation::report::AttemptResult;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// CSV header row.
pub const CSV_HEADER: &str =
    "attempt,timestamp,outcome,all,any,forbidden,pixel,unconditional,text,error";

/// Initializes CSV file with header if it doesn't exist or is empty.
///
/// If the file exists and has content, this does nothing (preserves existing data).
pub fn init_csv(path: &Path) -> Result<()> {
    if path.exists() {
        let file = File::open(path).context("Failed to open existing CSV")?;
        let reader = BufReader::new(file);
        if reader.lines().next().is_some() {
            return Ok(());
        }
    }

    let mut file = File::create(path).context("Failed to create CSV file")?;
    writeln!(file, "{}", CSV_HEADER).context("Failed to write CSV header")?;
    Ok(())
}

/// Quotes a field when it contains a separator, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Appends one attempt row.
///
/// Opens the file in append mode for each write, so completed attempts
/// survive a crash.
pub fn append_attempt(path: &Path, result: &AttemptResult) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context("Failed to open CSV for append")?;

    let line = format!(
        "{},{},{},{},{},{},{},{},{},{}",
        result.attempt,
        result.captured_at.format("%Y-%m-%dT%H:%M:%S%.3f"),
        result.outcome,
        result.matched_required_all,
        result.matched_required_any,
        result.matched_forbidden,
        result.pixel_passed,
        result.unconditional,
        csv_field(&result.recognized_text.join(" | ")),
        csv_field(result.recognition_error.as_deref().unwrap_or("")),
    );

    writeln!(file, "{}", line).context("Failed to write CSV row")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::report::AttemptOutcome;
    use chrono::Local;
    use tempfile::tempdir;

    fn result(attempt: u64, text: &[&str]) -> AttemptResult {
        AttemptResult {
            attempt,
            recognized_text: text.iter().map(|s| s.to_string()).collect(),
            matched_required_all: true,
            matched_required_any: false,
            matched_forbidden: false,
            pixel_passed: true,
            unconditional: false,
            recognition_error: None,
            outcome: AttemptOutcome::Continue,
            captured_at: Local::now(),
        }
    }

    #[test]
    fn test_init_csv_creates_header() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("attempts.csv");

        init_csv(&csv_path).unwrap();

        let content = std::fs::read_to_string(&csv_path).unwrap();
        assert!(content.starts_with(CSV_HEADER));
    }

    #[test]
    fn test_init_csv_preserves_existing() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("attempts.csv");

        std::fs::write(&csv_path, "existing,data\n1,2,3\n").unwrap();

        init_csv(&csv_path).unwrap();

        let content = std::fs::read_to_string(&csv_path).unwrap();
        assert!(content.starts_with("existing,data"));
    }

    #[test]
    fn test_append_attempt() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("attempts.csv");
        init_csv(&csv_path).unwrap();

        append_attempt(&csv_path, &result(1, &["Ring of Strength"])).unwrap();

        let content = std::fs::read_to_string(&csv_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("1,"));
        assert!(lines[1].ends_with(",continue,true,false,false,true,false,Ring of Strength,"));
    }

    #[test]
    fn test_append_quotes_text() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("attempts.csv");
        init_csv(&csv_path).unwrap();

        let mut failed = result(2, &["Sword, \"Keen\""]);
        failed.recognition_error = Some("OCR engine failed: exit 1".to_string());
        append_attempt(&csv_path, &failed).unwrap();

        let content = std::fs::read_to_string(&csv_path).unwrap();
        let row = content.lines().nth(1).unwrap();
        assert!(row.contains("\"Sword, \"\"Keen\"\"\""));
        assert!(row.ends_with("OCR engine failed: exit 1"));
    }

    #[test]
    fn test_append_multiple_rows() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("attempts.csv");
        init_csv(&csv_path).unwrap();

        for i in 1..=3 {
            append_attempt(&csv_path, &result(i, &["x"])).unwrap();
        }

        let content = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(content.lines().count(), 4);
    }
}
