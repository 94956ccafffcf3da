//! Error types for the attempt loop.
//!
//! Each kind maps to a different reaction of the loop: configuration errors
//! reject a run before it starts, actuator errors end it, recognition errors
//! only consume the current attempt.

use thiserror::Error;

/// A `LoopConfig` that cannot be run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// A delay is negative, NaN or infinite
    #[error("{field} must be a non-negative number of seconds (got {value})")]
    InvalidDelay { field: String, value: f64 },

    /// The text region has no area
    #[error("text region has zero area ({width}x{height}); select a region first")]
    EmptyRegion { width: u32, height: u32 },

    /// Negative attempt budget
    #[error("max_attempts must be >= 0 (got {0})")]
    NegativeMaxAttempts(i64),

    /// Negative or non-finite pixel tolerance
    #[error("pixel check tolerance must be >= 0 (got {0})")]
    InvalidTolerance(f64),

    /// A word could not be turned into a matcher
    #[error("word '{word}' cannot be matched: {reason}")]
    InvalidPattern { word: String, reason: String },

    /// A hotkey string that names no usable key
    #[error("invalid hotkey '{spec}': {reason}")]
    InvalidHotkey { spec: String, reason: String },
}

/// Input injection or screen read failure. Fatal to the current run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActuatorError {
    #[error("input injection failed: {0}")]
    Injection(String),

    #[error("failed to read pixel at ({x}, {y}): {reason}")]
    PixelRead { x: i32, y: i32, reason: String },

    #[error("failed to query cursor position: {0}")]
    CursorQuery(String),

    /// The blocking call never reported back
    #[error("actuator task failed: {0}")]
    Task(String),
}

/// Capture or OCR failure. Consumes one attempt, never ends the run.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("screen capture failed: {0}")]
    Capture(String),

    #[error("OCR engine failed: {0}")]
    Engine(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("recognition task failed: {0}")]
    Task(String),
}

/// Rejected control surface request.
#[derive(Debug, Error, PartialEq)]
pub enum ControlError {
    #[error("a run is already active; stop it before starting another")]
    AlreadyRunning,

    #[error("invalid configuration: {0}")]
    Invalid(#[from] ConfigError),
}
