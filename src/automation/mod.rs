//! Click-and-verify automation.
//!
//! This module provides:
//! - Loop configuration and its JSON persistence
//! - Word-list condition evaluation with an optional pixel check
//! - Click sequence execution through an input actuator
//! - The attempt loop state machine, its controller and command loop
//! - Per-attempt event recording to log and CSV

pub mod conditions;
pub mod config;
pub mod csv_writer;
pub mod input;
pub mod recorder;
pub mod report;
pub mod runner;
pub mod sequence;
pub mod state;

#[cfg(test)]
pub mod testing;

pub use conditions::{ConditionEvaluator, Evaluation, Verdict};
pub use config::{load_config, save_config, AppConfig, LoopConfig};
pub use input::InputActuator;
#[cfg(windows)]
pub use input::SendInputActuator;
pub use recorder::run_recorder;
pub use report::{create_event_channel, AttemptOutcome, AttemptResult, RunEvent, RunReport};
pub use runner::{control_loop, Collaborators, ControlCommand, LoopController};
pub use state::{CancelReason, LoopState, StopSignal};
