//! Configuration types for the attempt loop.
//!
//! Loads settings from config.json. Provides the click sequence, the text
//! region, the success/failure word lists, the optional pixel check,
//! timing parameters, hotkeys and OCR settings. Every field has a default so
//! a partial or older file still loads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::automation::conditions::normalize_text;
use crate::error::ConfigError;

/// Minimum settle time after each click, regardless of the configured delay.
pub const MIN_STEP_DELAY_SECS: f64 = 0.05;

/// A point in absolute screen pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An RGB color sampled from the screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Mean absolute per-channel difference (0.0 to 255.0).
    pub fn distance(&self, other: &Rgb) -> f64 {
        let dr = (self.r as i32 - other.r as i32).abs();
        let dg = (self.g as i32 - other.g as i32).abs();
        let db = (self.b as i32 - other.b as i32).abs();
        (dr + dg + db) as f64 / 3.0
    }
}

/// A rectangle in absolute screen pixels, captured for text recognition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Region {
    /// X position of top-left corner
    pub x: i32,
    /// Y position of top-left corner
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One click in the sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickStep {
    pub x: i32,
    pub y: i32,
    /// Free text shown in the log
    pub label: String,
    pub double_click: bool,
    /// Pause after the click (seconds)
    pub delay_after_secs: f64,
}

impl Default for ClickStep {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            label: String::new(),
            double_click: false,
            delay_after_secs: 0.15,
        }
    }
}

impl ClickStep {
    pub fn new(label: &str, x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            label: label.to_string(),
            ..Default::default()
        }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Ordered list of clicks executed once per attempt.
///
/// Editing operations take an index and return `false` when it is out of
/// range, leaving the sequence untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClickSequence(Vec<ClickStep>);

impl ClickSequence {
    pub fn new(steps: Vec<ClickStep>) -> Self {
        Self(steps)
    }

    pub fn steps(&self) -> &[ClickStep] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, step: ClickStep) {
        self.0.push(step);
    }

    /// Inserts before `index`; `index == len()` appends.
    pub fn insert(&mut self, index: usize, step: ClickStep) -> bool {
        if index > self.0.len() {
            return false;
        }
        self.0.insert(index, step);
        true
    }

    /// Places a copy of the step right after the original.
    pub fn duplicate(&mut self, index: usize) -> bool {
        match self.0.get(index).cloned() {
            Some(step) => {
                self.0.insert(index + 1, step);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, index: usize) -> bool {
        if index >= self.0.len() {
            return false;
        }
        self.0.remove(index);
        true
    }

    pub fn move_up(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.0.len() {
            return false;
        }
        self.0.swap(index - 1, index);
        true
    }

    pub fn move_down(&mut self, index: usize) -> bool {
        if index + 1 >= self.0.len() {
            return false;
        }
        self.0.swap(index, index + 1);
        true
    }
}

/// Case-insensitive set of words or phrases.
///
/// Entries are normalized on construction (trimmed, lower-cased, inner
/// whitespace collapsed); blank entries are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct WordList(BTreeSet<String>);

impl WordList {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            words
                .into_iter()
                .map(|w| normalize_text(w.as_ref()))
                .filter(|w| !w.is_empty())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for WordList {
    fn from(words: Vec<String>) -> Self {
        WordList::new(words)
    }
}

impl From<WordList> for Vec<String> {
    fn from(list: WordList) -> Self {
        list.0.into_iter().collect()
    }
}

/// How a word is located in the recognized text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Plain containment: "of" matches inside "ring of agility" and "offer"
    #[default]
    Substring,
    /// Phrase must be bounded by non-alphanumeric characters or text edges
    WholeWord,
}

/// Optional pixel color confirmation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PixelCheck {
    pub x: i32,
    pub y: i32,
    pub color: Rgb,
    /// Maximum mean per-channel difference still counted as a match
    pub tolerance: f64,
}

impl Default for PixelCheck {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            color: Rgb::default(),
            tolerance: 15.0,
        }
    }
}

impl PixelCheck {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn matches(&self, sample: &Rgb) -> bool {
        self.color.distance(sample) <= self.tolerance
    }
}

/// Everything a single run needs. Snapshotted when the run starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub click_steps: ClickSequence,
    pub region: Region,
    /// All of these must appear
    pub required_all: WordList,
    /// At least one of these must appear (ignored when empty)
    pub required_any: WordList,
    /// Any of these vetoes success
    pub forbidden: WordList,
    pub match_mode: MatchMode,
    pub pixel_check: Option<PixelCheck>,
    /// Wait between the last click and the capture (seconds)
    pub inter_attempt_delay_secs: f64,
    /// Attempt budget; 0 = unlimited. Signed so a bad value is reported, not wrapped.
    pub max_attempts: i64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            click_steps: ClickSequence::default(),
            region: Region::default(),
            required_all: WordList::default(),
            required_any: WordList::default(),
            forbidden: WordList::default(),
            match_mode: MatchMode::default(),
            pixel_check: None,
            inter_attempt_delay_secs: 0.5,
            max_attempts: 500,
        }
    }
}

impl LoopConfig {
    /// Checks every field a run depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_delay("inter_attempt_delay_secs", self.inter_attempt_delay_secs)?;

        for (i, step) in self.click_steps.steps().iter().enumerate() {
            check_delay(
                &format!("click_steps[{}].delay_after_secs", i),
                step.delay_after_secs,
            )?;
        }

        if self.region.is_empty() {
            return Err(ConfigError::EmptyRegion {
                width: self.region.width,
                height: self.region.height,
            });
        }

        if self.max_attempts < 0 {
            return Err(ConfigError::NegativeMaxAttempts(self.max_attempts));
        }

        if let Some(check) = &self.pixel_check {
            if !check.tolerance.is_finite() || check.tolerance < 0.0 {
                return Err(ConfigError::InvalidTolerance(check.tolerance));
            }
        }

        Ok(())
    }

    /// True when no word list and no pixel check constrain success.
    pub fn is_unconditional(&self) -> bool {
        self.required_all.is_empty()
            && self.required_any.is_empty()
            && self.forbidden.is_empty()
            && self.pixel_check.is_none()
    }
}

fn check_delay(field: &str, value: f64) -> Result<(), ConfigError> {
    // Also bounds the value to what a Duration can hold
    if Duration::try_from_secs_f64(value).is_ok() {
        Ok(())
    } else {
        Err(ConfigError::InvalidDelay {
            field: field.to_string(),
            value,
        })
    }
}

/// Global hotkey bindings, e.g. "F6" or "Ctrl+Shift+S".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    pub start: String,
    pub preview: String,
    pub stop: String,
    /// Appends the pointer position as a new click step
    pub capture: String,
    pub quit: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            start: "F6".to_string(),
            preview: "F7".to_string(),
            stop: "F8".to_string(),
            capture: "F9".to_string(),
            quit: "F10".to_string(),
        }
    }
}

/// Tesseract settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract language code
    pub language: String,
    /// Explicit tesseract executable; searched on PATH when unset
    pub tesseract_path: Option<String>,
    /// Scale factor applied before OCR, clamped to 1..=8
    pub upscale: u32,
    /// Tesseract --psm value
    pub page_segmentation_mode: u8,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            tesseract_path: None,
            upscale: 3,
            page_segmentation_mode: 6,
        }
    }
}

/// Complete persisted configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub automation: LoopConfig,
    pub hotkeys: HotkeyConfig,
    pub ocr: OcrConfig,
}

/// Loads configuration from `path` or returns defaults.
///
/// A missing, unreadable or malformed file never fails startup.
pub fn load_config(path: &Path) -> AppConfig {
    tracing::debug!("Looking for config at: {}", path.display());

    if !path.exists() {
        tracing::info!("{} not found. Using default config.", path.display());
        return AppConfig::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => {
                tracing::debug!("Config loaded from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                AppConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
            AppConfig::default()
        }
    }
}

/// Writes configuration as pretty JSON.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn valid_config() -> LoopConfig {
        LoopConfig {
            region: Region::new(100, 200, 300, 40),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_needs_region() {
        let err = LoopConfig::default().validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::EmptyRegion {
                width: 0,
                height: 0
            }
        );
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_negative_inter_attempt_delay_rejected() {
        let config = LoopConfig {
            inter_attempt_delay_secs: -0.5,
            ..valid_config()
        };
        match config.validate() {
            Err(ConfigError::InvalidDelay { field, .. }) => {
                assert_eq!(field, "inter_attempt_delay_secs")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_nan_step_delay_rejected() {
        let mut config = valid_config();
        config.click_steps.push(ClickStep::new("ok", 1, 1));
        config.click_steps.push(ClickStep {
            delay_after_secs: f64::NAN,
            ..ClickStep::new("bad", 2, 2)
        });
        match config.validate() {
            Err(ConfigError::InvalidDelay { field, .. }) => {
                assert_eq!(field, "click_steps[1].delay_after_secs")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_delay_beyond_duration_range_rejected() {
        for value in [1e20, f64::INFINITY, f64::MAX] {
            let config = LoopConfig {
                inter_attempt_delay_secs: value,
                ..valid_config()
            };
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidDelay { .. })),
                "{value} should be rejected"
            );
        }

        let mut config = valid_config();
        config.click_steps.push(ClickStep {
            delay_after_secs: 1e20,
            ..ClickStep::new("slow", 1, 1)
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDelay { .. })
        ));
    }

    #[test]
    fn test_zero_height_region_rejected() {
        let config = LoopConfig {
            region: Region::new(0, 0, 10, 0),
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyRegion { width: 10, height: 0 })
        ));
    }

    #[test]
    fn test_negative_max_attempts_rejected() {
        let config = LoopConfig {
            max_attempts: -1,
            ..valid_config()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NegativeMaxAttempts(-1))
        );
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let config = LoopConfig {
            pixel_check: Some(PixelCheck {
                tolerance: -2.0,
                ..Default::default()
            }),
            ..valid_config()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidTolerance(-2.0)));
    }

    #[test]
    fn test_word_list_normalizes() {
        let list = WordList::new(["  Of   Strength ", "AGILITY", "", "   ", "agility"]);
        let words: Vec<&str> = list.iter().collect();
        assert_eq!(words, vec!["agility", "of strength"]);
    }

    #[test]
    fn test_unconditional_detection() {
        let mut config = valid_config();
        assert!(config.is_unconditional());
        config.forbidden = WordList::new(["cursed"]);
        assert!(!config.is_unconditional());
    }

    #[test]
    fn test_pixel_check_tolerance() {
        let check = PixelCheck {
            color: Rgb::new(200, 100, 50),
            tolerance: 10.0,
            ..Default::default()
        };
        // mean diff = (15 + 15 + 0) / 3 = 10
        assert!(check.matches(&Rgb::new(215, 85, 50)));
        // mean diff = (31 + 0 + 0) / 3 > 10
        assert!(!check.matches(&Rgb::new(231, 100, 50)));
    }

    #[test]
    fn test_sequence_editing() {
        let mut seq = ClickSequence::new(vec![
            ClickStep::new("a", 1, 1),
            ClickStep::new("b", 2, 2),
            ClickStep::new("c", 3, 3),
        ]);
        let labels = |s: &ClickSequence| {
            s.steps()
                .iter()
                .map(|st| st.label.clone())
                .collect::<Vec<_>>()
                .join("")
        };

        assert!(seq.duplicate(0));
        assert_eq!(labels(&seq), "aabc");
        assert!(seq.move_down(1));
        assert_eq!(labels(&seq), "abac");
        assert!(seq.move_up(3));
        assert_eq!(labels(&seq), "abca");
        assert!(seq.remove(0));
        assert_eq!(labels(&seq), "bca");
        assert!(seq.insert(3, ClickStep::new("z", 9, 9)));
        assert_eq!(labels(&seq), "bcaz");
    }

    #[test]
    fn test_sequence_editing_out_of_range() {
        let mut seq = ClickSequence::new(vec![ClickStep::new("a", 1, 1)]);
        assert!(!seq.move_up(0));
        assert!(!seq.move_down(0));
        assert!(!seq.duplicate(1));
        assert!(!seq.remove(5));
        assert!(!seq.insert(2, ClickStep::default()));
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config(&dir.path().join("config.json"));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_malformed_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ this is not json").unwrap();
        assert_eq!(load_config(&path), AppConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults_and_ignores_unknown() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "automation": {
                    "region": { "x": 5, "y": 6, "width": 70, "height": 20 },
                    "required_any": ["Sharp", "keen"],
                    "some_future_field": 42
                },
                "theme": "dark"
            }"#,
        )
        .unwrap();

        let config = load_config(&path);
        assert_eq!(config.automation.region, Region::new(5, 6, 70, 20));
        assert_eq!(config.automation.required_any.len(), 2);
        assert_eq!(config.automation.max_attempts, 500);
        assert_eq!(config.automation.inter_attempt_delay_secs, 0.5);
        assert_eq!(config.hotkeys.start, "F6");
        assert_eq!(config.hotkeys.capture, "F9");
        assert_eq!(config.ocr.language, "eng");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.automation.region = Region::new(10, 20, 30, 40);
        config.automation.click_steps.push(ClickStep {
            double_click: true,
            ..ClickStep::new("reroll", 640, 480)
        });
        config.automation.forbidden = WordList::new(["of strength"]);
        config.automation.match_mode = MatchMode::WholeWord;
        config.automation.pixel_check = Some(PixelCheck {
            x: 3,
            y: 4,
            color: Rgb::new(1, 2, 3),
            tolerance: 5.0,
        });

        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path), config);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"whole_word\""));
    }
}
