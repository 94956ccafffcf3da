//! Attempt loop states and the stop signal shared by one run.
//!
//! A run moves Idle → Running → one of the four terminal states. Every
//! suspension point in the run races the `StopSignal`, so a stop request
//! takes effect without waiting out a delay or a slow recognition.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Why a run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Stop hotkey or `LoopController::stop`
    UserStop,
    /// Pointer pushed into the sentinel corner
    EmergencyStop,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::UserStop => write!(f, "stopped by user"),
            CancelReason::EmergencyStop => write!(f, "emergency stop"),
        }
    }
}

/// What a running attempt is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Clicking,
    Waiting,
    Scanning,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Clicking => write!(f, "Clicking"),
            Phase::Waiting => write!(f, "Waiting"),
            Phase::Scanning => write!(f, "Scanning"),
        }
    }
}

/// Attempt loop state machine states.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    /// Not started yet
    Idle,
    /// Inside an attempt
    Running(Phase),
    /// Conditions matched
    Succeeded,
    /// Attempt budget used up without a match
    Exhausted,
    /// Stop or emergency stop
    Cancelled(CancelReason),
    /// Input injection or pixel read failed
    Errored(String),
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::Idle => write!(f, "Idle"),
            LoopState::Running(phase) => write!(f, "Running ({})", phase),
            LoopState::Succeeded => write!(f, "Succeeded"),
            LoopState::Exhausted => write!(f, "Exhausted"),
            LoopState::Cancelled(reason) => write!(f, "Cancelled: {}", reason),
            LoopState::Errored(msg) => write!(f, "Error: {}", msg),
        }
    }
}

/// Cancellation for one run. Clones share the same signal.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
    emergency: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a graceful stop.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Stops the run and records that the sentinel fired.
    pub fn emergency_stop(&self) {
        self.emergency.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> CancelReason {
        if self.emergency.load(Ordering::SeqCst) {
            CancelReason::EmergencyStop
        } else {
            CancelReason::UserStop
        }
    }

    /// Resolves once the run is stopped.
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }

    /// Sleeps for `duration` unless stopped first.
    ///
    /// Returns `true` if the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(format!("{}", LoopState::Idle), "Idle");
        assert_eq!(
            format!("{}", LoopState::Running(Phase::Scanning)),
            "Running (Scanning)"
        );
        assert_eq!(
            format!("{}", LoopState::Cancelled(CancelReason::EmergencyStop)),
            "Cancelled: emergency stop"
        );
        assert_eq!(
            format!("{}", LoopState::Errored("test".to_string())),
            "Error: test"
        );
    }

    #[test]
    fn test_stop_reason() {
        let signal = StopSignal::new();
        assert!(!signal.is_stopped());
        signal.stop();
        assert!(signal.is_stopped());
        assert_eq!(signal.reason(), CancelReason::UserStop);

        let signal = StopSignal::new();
        let clone = signal.clone();
        clone.emergency_stop();
        assert!(signal.is_stopped());
        assert_eq!(signal.reason(), CancelReason::EmergencyStop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_stop() {
        let signal = StopSignal::new();
        let stopper = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            stopper.stop();
        });

        let start = tokio::time::Instant::now();
        assert!(!signal.sleep(Duration::from_secs(3600)).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes() {
        let signal = StopSignal::new();
        assert!(signal.sleep(Duration::from_millis(250)).await);
        assert!(!signal.is_stopped());
    }
}
