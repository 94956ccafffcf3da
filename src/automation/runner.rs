//! Attempt loop runner and its controller.
//!
//! `LoopController` owns at most one active run. Each run is a tokio task
//! executing `run_attempt_loop`; commands arrive over a single-consumer
//! channel drained by `control_loop`.

use anyhow::anyhow;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::automation::conditions::{ConditionEvaluator, Verdict};
use crate::automation::config::{load_config, save_config, ClickStep, LoopConfig, Point, Rgb};
use crate::automation::input::InputActuator;
use crate::automation::report::{AttemptOutcome, AttemptResult, RunEvent, RunReport};
use crate::automation::sequence::{actuate, ClickSequenceRunner, SequenceError};
use crate::automation::state::{LoopState, Phase, StopSignal};
use crate::capture::ScreenCapturer;
use crate::error::{ConfigError, ControlError, RecognitionError};
use crate::ocr::TextRecognizer;

/// How often the sentinel corner is polled while a run is active.
const EMERGENCY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The external capabilities a run drives.
#[derive(Clone)]
pub struct Collaborators {
    pub actuator: Arc<dyn InputActuator>,
    pub capturer: Arc<dyn ScreenCapturer>,
    pub recognizer: Arc<dyn TextRecognizer>,
}

/// A validated configuration snapshot with its compiled matchers.
pub struct PreparedRun {
    config: LoopConfig,
    evaluator: ConditionEvaluator,
    delay: Duration,
    max_attempts: u64,
}

impl PreparedRun {
    pub fn new(config: LoopConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let evaluator = ConditionEvaluator::from_config(&config)?;
        let delay = Duration::from_secs_f64(config.inter_attempt_delay_secs);
        // validate() rejected negative budgets
        let max_attempts = config.max_attempts as u64;
        Ok(Self {
            config,
            evaluator,
            delay,
            max_attempts,
        })
    }

    /// Success would carry no information.
    pub fn is_unconditional(&self) -> bool {
        self.config.is_unconditional()
    }
}

/// Blocking capture plus recognition.
type ScanTask = JoinHandle<Result<Vec<String>, RecognitionError>>;

/// Captures the region, reads it and evaluates one attempt.
///
/// `Err` carries the terminal state when the run was stopped or the pixel
/// read failed. Capture and OCR failures are recorded in the result instead.
/// A scan interrupted by a stop is handed back through `abandoned`.
async fn scan_and_evaluate(
    prepared: &PreparedRun,
    collab: &Collaborators,
    signal: &StopSignal,
    attempt: u64,
    abandoned: &mut Option<ScanTask>,
) -> Result<AttemptResult, LoopState> {
    let capturer = Arc::clone(&collab.capturer);
    let recognizer = Arc::clone(&collab.recognizer);
    let region = prepared.config.region;
    let mut task: ScanTask =
        tokio::task::spawn_blocking(move || -> Result<Vec<String>, RecognitionError> {
            let image = capturer.capture(&region)?;
            let lines = recognizer.recognize(&image)?;
            Ok(lines.into_iter().map(|line| line.text).collect())
        });

    let joined = tokio::select! {
        biased;
        _ = signal.stopped() => None,
        joined = &mut task => Some(joined),
    };
    let Some(joined) = joined else {
        *abandoned = Some(task);
        return Err(LoopState::Cancelled(signal.reason()));
    };
    let scanned = joined
        .map_err(|e| RecognitionError::Task(e.to_string()))
        .and_then(|r| r);
    let captured_at = Local::now();

    let pixel = match &prepared.config.pixel_check {
        Some(check) => {
            let point = check.point();
            match actuate(&collab.actuator, move |a| a.read_pixel(point)).await {
                Ok(sample) => Some(check.matches(&sample)),
                Err(e) => {
                    tracing::error!("Pixel check failed: {}", e);
                    return Err(LoopState::Errored(e.to_string()));
                }
            }
        }
        None => None,
    };

    let (lines, recognition_error) = match scanned {
        Ok(lines) => (lines, None),
        Err(e) => (Vec::new(), Some(e.to_string())),
    };

    let evaluation = prepared.evaluator.evaluate(&lines, pixel);
    let outcome = if recognition_error.is_none() && evaluation.verdict == Verdict::Match {
        AttemptOutcome::Success
    } else {
        AttemptOutcome::Continue
    };

    Ok(AttemptResult {
        attempt,
        recognized_text: lines,
        matched_required_all: evaluation.all_hit,
        matched_required_any: evaluation.any_hit,
        matched_forbidden: evaluation.forbidden_hit,
        pixel_passed: evaluation.pixel_passed,
        unconditional: evaluation.unconditional,
        recognition_error,
        outcome,
        captured_at,
    })
}

/// One full attempt: clicks, delay, scan, evaluation.
async fn run_attempt(
    prepared: &PreparedRun,
    collab: &Collaborators,
    clicker: &ClickSequenceRunner,
    signal: &StopSignal,
    state: &watch::Sender<LoopState>,
    attempt: u64,
    abandoned: &mut Option<ScanTask>,
) -> Result<AttemptResult, LoopState> {
    state.send_replace(LoopState::Running(Phase::Clicking));
    match clicker.execute(&prepared.config.click_steps, signal).await {
        Ok(()) => {}
        Err(SequenceError::Aborted(reason)) => return Err(LoopState::Cancelled(reason)),
        Err(SequenceError::Actuator(e)) => {
            tracing::error!("Click sequence failed on attempt {}: {}", attempt, e);
            return Err(LoopState::Errored(e.to_string()));
        }
    }

    state.send_replace(LoopState::Running(Phase::Waiting));
    if !signal.sleep(prepared.delay).await {
        return Err(LoopState::Cancelled(signal.reason()));
    }

    state.send_replace(LoopState::Running(Phase::Scanning));
    scan_and_evaluate(prepared, collab, signal, attempt, abandoned).await
}

/// Polls the sentinel corner until the run stops.
fn spawn_emergency_watcher(actuator: Arc<dyn InputActuator>, signal: StopSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(EMERGENCY_POLL_INTERVAL);
        loop {
            tokio::select! {
                biased;
                _ = signal.stopped() => break,
                _ = ticker.tick() => {
                    if actuator.emergency_stop_engaged() {
                        tracing::warn!("Emergency stop: pointer in top-left corner");
                        signal.emergency_stop();
                        break;
                    }
                }
            }
        }
    })
}

/// Runs attempts until success, budget exhaustion, cancellation or error.
///
/// Attempts are strictly sequential. Every attempt emits exactly one
/// `RunEvent::Attempt`; the stream is framed by `Started` and `Finished`.
///
/// The terminal state is published as soon as the loop ends, but the task
/// only completes once a scan interrupted by a stop has returned, so no two
/// recognitions ever overlap.
pub async fn run_attempt_loop(
    prepared: PreparedRun,
    collab: Collaborators,
    signal: StopSignal,
    events: mpsc::UnboundedSender<RunEvent>,
    state: Arc<watch::Sender<LoopState>>,
) -> RunReport {
    let started = Instant::now();
    let _ = events.send(RunEvent::Started {
        started_at: Local::now(),
        max_attempts: prepared.max_attempts,
        steps: prepared.config.click_steps.len(),
    });

    let watcher = spawn_emergency_watcher(Arc::clone(&collab.actuator), signal.clone());
    let clicker = ClickSequenceRunner::new(Arc::clone(&collab.actuator));
    let mut attempts: u64 = 0;
    let mut abandoned = None;

    let final_state = loop {
        if prepared.max_attempts > 0 && attempts >= prepared.max_attempts {
            break LoopState::Exhausted;
        }
        if signal.is_stopped() {
            break LoopState::Cancelled(signal.reason());
        }

        match run_attempt(
            &prepared,
            &collab,
            &clicker,
            &signal,
            &state,
            attempts + 1,
            &mut abandoned,
        )
        .await
        {
            Ok(result) => {
                attempts += 1;
                let success = result.outcome == AttemptOutcome::Success;
                let _ = events.send(RunEvent::Attempt(result));
                if success {
                    break LoopState::Succeeded;
                }
            }
            Err(terminal) => break terminal,
        }
    };

    watcher.abort();
    state.send_replace(final_state.clone());

    let report = RunReport {
        state: final_state,
        attempts,
        elapsed: started.elapsed(),
    };
    let _ = events.send(RunEvent::Finished(report.clone()));

    if let Some(task) = abandoned {
        tracing::debug!("Waiting for the interrupted recognition to return");
        match task.await {
            Ok(Ok(_)) => tracing::debug!("Interrupted recognition returned; result dropped"),
            Ok(Err(e)) => tracing::debug!("Interrupted recognition failed: {}", e),
            Err(e) => tracing::warn!("Interrupted recognition task failed: {}", e),
        }
    }
    report
}

struct ActiveRun {
    signal: StopSignal,
    handle: JoinHandle<RunReport>,
}

/// Start/stop surface over the attempt loop. At most one run is active.
pub struct LoopController {
    collab: Collaborators,
    events: mpsc::UnboundedSender<RunEvent>,
    active: Option<ActiveRun>,
    state: Arc<watch::Sender<LoopState>>,
}

impl LoopController {
    pub fn new(collab: Collaborators, events: mpsc::UnboundedSender<RunEvent>) -> Self {
        let (state, _) = watch::channel(LoopState::Idle);
        Self {
            collab,
            events,
            active: None,
            state: Arc::new(state),
        }
    }

    /// Current state of the latest run (Idle before the first one).
    pub fn state(&self) -> LoopState {
        self.state.borrow().clone()
    }

    /// True until the run task completes, including the wind-down after a stop.
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }

    /// Validates `config` and starts a run on it.
    ///
    /// The config is owned by the run, so later edits never reach it.
    pub fn start(&mut self, config: LoopConfig) -> Result<(), ControlError> {
        if self.is_running() {
            return Err(ControlError::AlreadyRunning);
        }

        let prepared = PreparedRun::new(config)?;
        if prepared.is_unconditional() {
            tracing::warn!(
                "No word list and no pixel check configured: the first attempt will match unconditionally"
            );
        }

        let signal = StopSignal::new();
        self.state.send_replace(LoopState::Running(Phase::Clicking));
        let handle = tokio::spawn(run_attempt_loop(
            prepared,
            self.collab.clone(),
            signal.clone(),
            self.events.clone(),
            Arc::clone(&self.state),
        ));
        self.active = Some(ActiveRun { signal, handle });
        Ok(())
    }

    /// Requests a graceful stop of the active run. No-op when idle.
    pub fn stop(&self) {
        if let Some(run) = &self.active {
            run.signal.stop();
        }
    }

    /// Waits for the latest run to finish and returns its report.
    pub async fn wait(&mut self) -> Option<RunReport> {
        let run = self.active.take()?;
        match run.handle.await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!("Run task failed: {}", e);
                None
            }
        }
    }

    /// One capture + recognition + evaluation without clicking.
    ///
    /// The result carries attempt number 0.
    pub async fn preview(&self, config: &LoopConfig) -> anyhow::Result<AttemptResult> {
        if self.is_running() {
            return Err(anyhow!(ControlError::AlreadyRunning));
        }
        let prepared = PreparedRun::new(config.clone())?;
        // Never stopped, so nothing is left behind
        let mut abandoned = None;
        scan_and_evaluate(&prepared, &self.collab, &StopSignal::new(), 0, &mut abandoned)
            .await
            .map_err(|state| anyhow!("preview failed: {}", state))
    }

    /// Reads the pointer position and the colour under it.
    ///
    /// Refused while a run is active: the pointer belongs to the run then.
    pub async fn capture_point(&self) -> anyhow::Result<(Point, Rgb)> {
        if self.is_running() {
            return Err(anyhow!(ControlError::AlreadyRunning));
        }
        let point = actuate(&self.collab.actuator, |a| a.cursor_position()).await?;
        let color = actuate(&self.collab.actuator, move |a| a.read_pixel(point)).await?;
        Ok((point, color))
    }
}

/// Appends a click step at `point` to the saved config.
fn append_captured_step(config_path: &Path, point: Point) -> anyhow::Result<usize> {
    let mut config = load_config(config_path);
    let steps = &mut config.automation.click_steps;
    let label = format!("step {}", steps.len() + 1);
    steps.push(ClickStep::new(&label, point.x, point.y));
    let count = steps.len();
    save_config(config_path, &config)?;
    Ok(count)
}

/// Commands from the hotkey thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
    Preview,
    /// Record the pointer position as a new click step
    Capture,
    Shutdown,
}

/// Drains commands until `Shutdown` or until every sender is dropped.
///
/// `Start` and `Preview` reload the config file, so the saved settings are
/// what a run sees.
pub async fn control_loop(
    mut commands: mpsc::Receiver<ControlCommand>,
    mut controller: LoopController,
    config_path: PathBuf,
) {
    tracing::debug!("Control loop started");

    while let Some(command) = commands.recv().await {
        tracing::debug!("Command: {:?}", command);
        match command {
            ControlCommand::Start => {
                let config = load_config(&config_path).automation;
                match controller.start(config) {
                    Ok(()) => tracing::info!(
                        "Run started (stop hotkey or move the pointer to the top-left corner to abort)"
                    ),
                    Err(e) => tracing::warn!("Start refused: {}", e),
                }
            }
            ControlCommand::Stop => {
                if controller.is_running() {
                    tracing::info!("Stop requested");
                    controller.stop();
                } else {
                    tracing::debug!("Stop ignored: no active run");
                }
            }
            ControlCommand::Preview => {
                let config = load_config(&config_path).automation;
                match controller.preview(&config).await {
                    Ok(result) => tracing::info!(
                        "Preview: {} (all={} any={} forbidden={} pixel={}) '{}'",
                        if result.outcome == AttemptOutcome::Success {
                            "MATCH"
                        } else {
                            "no match"
                        },
                        result.matched_required_all,
                        result.matched_required_any,
                        result.matched_forbidden,
                        result.pixel_passed,
                        result
                            .recognition_error
                            .clone()
                            .unwrap_or_else(|| result.text_preview(120))
                    ),
                    Err(e) => tracing::warn!("Preview refused: {:#}", e),
                }
            }
            ControlCommand::Capture => match controller.capture_point().await {
                Ok((point, color)) => {
                    tracing::info!(
                        "Pointer at ({}, {}), colour ({}, {}, {})",
                        point.x,
                        point.y,
                        color.r,
                        color.g,
                        color.b
                    );
                    match append_captured_step(&config_path, point) {
                        Ok(count) => tracing::info!("Saved as click step {}", count),
                        Err(e) => tracing::warn!("Could not save click step: {:#}", e),
                    }
                }
                Err(e) => tracing::warn!("Capture refused: {:#}", e),
            },
            ControlCommand::Shutdown => break,
        }
    }

    controller.stop();
    if let Some(report) = controller.wait().await {
        tracing::info!("Last run ended: {}", report.state);
    }
    tracing::debug!("Control loop finished");
}
