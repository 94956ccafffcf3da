//! Executes a click sequence through the actuator.

use std::sync::Arc;
use std::time::Duration;

use crate::automation::config::{ClickSequence, MIN_STEP_DELAY_SECS};
use crate::automation::input::InputActuator;
use crate::automation::state::{CancelReason, StopSignal};
use crate::error::ActuatorError;

/// Why a sequence did not complete.
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceError {
    /// The run was stopped before or between steps
    Aborted(CancelReason),
    /// Input injection failed
    Actuator(ActuatorError),
}

impl From<ActuatorError> for SequenceError {
    fn from(e: ActuatorError) -> Self {
        SequenceError::Actuator(e)
    }
}

/// Runs a blocking actuator call off the async executor.
pub(crate) async fn actuate<T, F>(actuator: &Arc<dyn InputActuator>, f: F) -> Result<T, ActuatorError>
where
    T: Send + 'static,
    F: FnOnce(&dyn InputActuator) -> Result<T, ActuatorError> + Send + 'static,
{
    let actuator = Arc::clone(actuator);
    tokio::task::spawn_blocking(move || f(actuator.as_ref()))
        .await
        .map_err(|e| ActuatorError::Task(e.to_string()))?
}

pub struct ClickSequenceRunner {
    actuator: Arc<dyn InputActuator>,
}

impl ClickSequenceRunner {
    pub fn new(actuator: Arc<dyn InputActuator>) -> Self {
        Self { actuator }
    }

    /// Checks the sentinel and converts it into an emergency stop.
    fn guard(&self, signal: &StopSignal) -> Result<(), SequenceError> {
        if self.actuator.emergency_stop_engaged() {
            tracing::warn!("Emergency stop: pointer in top-left corner");
            signal.emergency_stop();
            return Err(SequenceError::Aborted(CancelReason::EmergencyStop));
        }
        Ok(())
    }

    /// Clicks every step in order.
    ///
    /// A click already handed to the OS is never abandoned; a stop takes
    /// effect before the next action or during the post-click delay.
    pub async fn execute(
        &self,
        sequence: &ClickSequence,
        signal: &StopSignal,
    ) -> Result<(), SequenceError> {
        for (i, step) in sequence.steps().iter().enumerate() {
            if signal.is_stopped() {
                return Err(SequenceError::Aborted(signal.reason()));
            }

            let point = step.point();
            self.guard(signal)?;
            actuate(&self.actuator, move |a| a.move_to(point)).await?;

            self.guard(signal)?;
            let double = step.double_click;
            actuate(&self.actuator, move |a| a.click(point, double)).await?;

            tracing::debug!(
                "Step {}/{} '{}' clicked at ({}, {}){}",
                i + 1,
                sequence.len(),
                step.label,
                point.x,
                point.y,
                if double { " [double]" } else { "" }
            );

            let delay = step.delay_after_secs.max(MIN_STEP_DELAY_SECS);
            if !signal.sleep(Duration::from_secs_f64(delay)).await {
                return Err(SequenceError::Aborted(signal.reason()));
            }
        }
        Ok(())
    }
}
