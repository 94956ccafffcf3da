//! Success/failure decision for one attempt.
//!
//! Recognized lines are joined and matched case-insensitively against three
//! word lists. A forbidden hit vetoes success; otherwise every `required_all`
//! word, at least one `required_any` word (when that list is non-empty) and
//! the pixel check must all pass.

use regex::Regex;

use crate::automation::config::{LoopConfig, MatchMode, WordList};
use crate::error::ConfigError;

/// Binary outcome of condition evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Match,
    NoMatch,
}

/// Verdict plus the individual checks that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub all_hit: bool,
    pub any_hit: bool,
    pub forbidden_hit: bool,
    pub pixel_passed: bool,
    /// Nothing was configured to check; the match carries no information
    pub unconditional: bool,
}

/// Lower-cases and collapses whitespace runs into single spaces.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// One compiled word: either a plain needle or a bounded regex.
#[derive(Debug)]
enum Needle {
    Plain(String),
    Bounded(Regex),
}

impl Needle {
    fn compile(word: &str, mode: MatchMode) -> Result<Self, ConfigError> {
        match mode {
            MatchMode::Substring => Ok(Needle::Plain(word.to_string())),
            MatchMode::WholeWord => {
                let pattern = format!(
                    r"(?:^|[^\p{{L}}\p{{N}}]){}(?:$|[^\p{{L}}\p{{N}}])",
                    regex::escape(word)
                );
                Regex::new(&pattern)
                    .map(Needle::Bounded)
                    .map_err(|e| ConfigError::InvalidPattern {
                        word: word.to_string(),
                        reason: e.to_string(),
                    })
            }
        }
    }

    fn found_in(&self, text: &str) -> bool {
        match self {
            Needle::Plain(word) => text.contains(word.as_str()),
            Needle::Bounded(re) => re.is_match(text),
        }
    }
}

fn compile_list(list: &WordList, mode: MatchMode) -> Result<Vec<Needle>, ConfigError> {
    list.iter().map(|w| Needle::compile(w, mode)).collect()
}

/// Word lists compiled once per run. Evaluation is pure.
#[derive(Debug)]
pub struct ConditionEvaluator {
    required_all: Vec<Needle>,
    required_any: Vec<Needle>,
    forbidden: Vec<Needle>,
}

impl ConditionEvaluator {
    pub fn new(
        required_all: &WordList,
        required_any: &WordList,
        forbidden: &WordList,
        mode: MatchMode,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            required_all: compile_list(required_all, mode)?,
            required_any: compile_list(required_any, mode)?,
            forbidden: compile_list(forbidden, mode)?,
        })
    }

    pub fn from_config(config: &LoopConfig) -> Result<Self, ConfigError> {
        Self::new(
            &config.required_all,
            &config.required_any,
            &config.forbidden,
            config.match_mode,
        )
    }

    /// True when no word list constrains the text.
    pub fn is_vacuous(&self) -> bool {
        self.required_all.is_empty() && self.required_any.is_empty() && self.forbidden.is_empty()
    }

    /// Evaluates recognized lines.
    ///
    /// `pixel` is `None` when no pixel check is configured (counts as passed).
    pub fn evaluate<S: AsRef<str>>(&self, lines: &[S], pixel: Option<bool>) -> Evaluation {
        let joined = lines.iter().map(|l| l.as_ref()).collect::<Vec<_>>().join(" ");
        let text = normalize_text(&joined);

        let forbidden_hit = self.forbidden.iter().any(|n| n.found_in(&text));
        let all_hit = self.required_all.iter().all(|n| n.found_in(&text));
        let any_hit = self.required_any.is_empty() || self.required_any.iter().any(|n| n.found_in(&text));
        let pixel_passed = pixel.unwrap_or(true);
        let unconditional = self.is_vacuous() && pixel.is_none();

        let verdict = if !forbidden_hit && all_hit && any_hit && pixel_passed {
            Verdict::Match
        } else {
            Verdict::NoMatch
        };

        Evaluation {
            verdict,
            all_hit,
            any_hit,
            forbidden_hit,
            pixel_passed,
            unconditional,
        }
    }
}
