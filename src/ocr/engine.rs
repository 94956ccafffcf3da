use image::{GrayImage, RgbaImage};
use std::process::Command;
use std::time::Instant;
use tempfile::NamedTempFile;

use super::preprocess::prepare_for_ocr;
use super::setup::TesseractPaths;
use crate::automation::config::OcrConfig;
use crate::error::RecognitionError;

/// Represents a line of OCR text with confidence score
#[derive(Debug, Clone, PartialEq)]
pub struct OcrLine {
    pub text: String,
    pub words: Vec<OcrWord>,
    /// Mean word confidence (0-100)
    pub confidence: f32,
}

/// Represents a single word from OCR with confidence score
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f32,
}

impl OcrLine {
    /// Builds a line whose words share the line's confidence.
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            words: text
                .split_whitespace()
                .map(|w| OcrWord {
                    text: w.to_string(),
                    confidence,
                })
                .collect(),
            confidence,
        }
    }
}

/// Reads text from a captured region.
///
/// May be slow (hundreds of milliseconds); callers run it off the async
/// executor.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &RgbaImage) -> Result<Vec<OcrLine>, RecognitionError>;
}

/// Runs the Tesseract CLI with TSV output.
pub struct TesseractRecognizer {
    paths: TesseractPaths,
    language: String,
    upscale: u32,
    psm: u8,
}

impl TesseractRecognizer {
    pub fn new(paths: TesseractPaths, config: &OcrConfig) -> Self {
        Self {
            paths,
            language: config.language.clone(),
            upscale: config.upscale,
            psm: config.page_segmentation_mode,
        }
    }

    fn run_tesseract(&self, img: &GrayImage) -> Result<String, RecognitionError> {
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())?;

        let mut command = Command::new(&self.paths.executable);
        command
            .arg(temp_input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(self.psm.to_string());
        if let Some(tessdata) = &self.paths.tessdata {
            command.arg("--tessdata-dir").arg(tessdata);
        }
        command.arg("tsv");

        let output = command.output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::Engine(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, image: &RgbaImage) -> Result<Vec<OcrLine>, RecognitionError> {
        let started = Instant::now();
        let prepared = prepare_for_ocr(image, self.upscale);
        let tsv = self.run_tesseract(&prepared)?;
        let lines = parse_tsv_output(&tsv);

        tracing::debug!(
            "OCR: {} line(s) in {}ms",
            lines.len(),
            started.elapsed().as_millis()
        );
        for line in &lines {
            tracing::debug!("  {:5.1}% {}", line.confidence, line.text);
        }

        Ok(lines)
    }
}

/// Words accumulated for the line currently being parsed.
#[derive(Default)]
struct LineBuilder {
    key: Option<(i32, i32, i32)>,
    words: Vec<OcrWord>,
}

impl LineBuilder {
    fn finish(&mut self, out: &mut Vec<OcrLine>) {
        if self.words.is_empty() {
            return;
        }
        let words = std::mem::take(&mut self.words);
        let confidence = words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32;
        let text = words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        out.push(OcrLine {
            text,
            words,
            confidence,
        });
    }
}

/// Parses Tesseract TSV output into lines.
///
/// Only level-5 (word) rows with non-negative confidence are kept. A line is
/// identified by (block, paragraph, line) because tesseract restarts line
/// numbers inside every block.
pub fn parse_tsv_output(tsv: &str) -> Vec<OcrLine> {
    let mut lines = Vec::new();
    let mut current = LineBuilder::default();

    for row in tsv.lines().skip(1) {
        // level, page_num, block_num, par_num, line_num, word_num,
        // left, top, width, height, conf, text
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = fields[0].parse().unwrap_or(-1);
        if level != 5 {
            continue;
        }

        let text = fields[11].trim();
        let conf: f32 = fields[10].trim().parse().unwrap_or(-1.0);
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (
            fields[2].parse().unwrap_or(-1),
            fields[3].parse().unwrap_or(-1),
            fields[4].parse().unwrap_or(-1),
        );
        if current.key != Some(key) {
            current.finish(&mut lines);
            current.key = Some(key);
        }

        current.words.push(OcrWord {
            text: text.to_string(),
            confidence: conf,
        });
    }

    current.finish(&mut lines);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word(block: i32, line: i32, word: i32, conf: f32, text: &str) -> String {
        format!(
            "5\t1\t{}\t1\t{}\t{}\t0\t0\t10\t10\t{}\t{}",
            block, line, word, conf, text
        )
    }

    #[test]
    fn test_parse_groups_words_into_lines() {
        let tsv = [
            HEADER.to_string(),
            "1\t1\t0\t0\t0\t0\t0\t0\t300\t60\t-1\t".to_string(),
            word(1, 1, 1, 90.0, "Ring"),
            word(1, 1, 2, 80.0, "of"),
            word(1, 1, 3, 70.0, "Agility"),
            word(1, 2, 1, 95.0, "+5"),
        ]
        .join("\n");

        let lines = parse_tsv_output(&tsv);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Ring of Agility");
        assert_eq!(lines[0].words.len(), 3);
        assert!((lines[0].confidence - 80.0).abs() < 0.01);
        assert_eq!(lines[1].text, "+5");
    }

    #[test]
    fn test_parse_separates_blocks_with_same_line_number() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, 1, 90.0, "Jagged"),
            word(2, 1, 1, 90.0, "Dagger"),
        ]
        .join("\n");

        let lines = parse_tsv_output(&tsv);
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["Jagged", "Dagger"]);
    }

    #[test]
    fn test_parse_skips_empty_and_unconfident_words() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, 1, -1.0, "ghost"),
            word(1, 1, 2, 88.0, " "),
            word(1, 1, 3, 60.0, "Keen"),
            "garbage row".to_string(),
        ]
        .join("\n");

        let lines = parse_tsv_output(&tsv);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Keen");
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_tsv_output("").is_empty());
        assert!(parse_tsv_output(HEADER).is_empty());
    }

    #[test]
    fn test_line_new_splits_words() {
        let line = OcrLine::new("Jagged  Dagger", 75.0);
        assert_eq!(line.words.len(), 2);
        assert_eq!(line.words[1].text, "Dagger");
    }
}
