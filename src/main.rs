//! OCR Auto-Clicker
//!
//! A hotkey-driven Windows tool that repeats a click sequence, reads a screen
//! region with Tesseract and stops once the recognized text satisfies the
//! configured word lists.

mod automation;
mod capture;
mod error;
mod hotkey;
mod ocr;
mod paths;

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::automation::{load_config, save_config, AppConfig};

/// Local wall-clock timestamps for log lines.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Logs to both console and `logs/ocr_autoclicker.log`.
fn init_logging() -> Result<()> {
    let log_path = paths::get_logs_dir().join("ocr_autoclicker.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_timer(LocalTimer).with_target(false))
        .with(
            fmt::layer()
                .with_timer(LocalTimer)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("Failed to install log subscriber")?;
    Ok(())
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = if let Some(loc) = panic_info.location() {
            format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column())
        } else {
            String::new()
        };
        tracing::error!("[PANIC]{} {}", location, msg);
    }));
}

/// Loads config.json, writing a default one first when it is missing.
fn load_or_create_config(path: &Path) -> AppConfig {
    if !path.exists() {
        match save_config(path, &AppConfig::default()) {
            Ok(()) => tracing::info!("Wrote default config to {}", path.display()),
            Err(e) => tracing::warn!("Could not write default config: {:#}", e),
        }
    }

    let config = load_config(path);
    let automation = &config.automation;
    tracing::info!(
        "Config: {} click step(s), region {}x{} at ({}, {}), max attempts {}",
        automation.click_steps.len(),
        automation.region.width,
        automation.region.height,
        automation.region.x,
        automation.region.y,
        automation.max_attempts
    );
    if let Err(e) = automation.validate() {
        tracing::warn!("Saved config cannot start a run yet: {}", e);
    }
    config
}

fn main() -> Result<()> {
    // Ensure output directories exist
    paths::ensure_directories().context("Failed to create output directories")?;
    init_logging()?;
    install_panic_hook();

    let config_path = paths::get_config_path();
    let config = load_or_create_config(&config_path);

    run(config, config_path)
}

/// Wires the Windows collaborators and blocks in the hotkey loop.
#[cfg(windows)]
fn run(config: AppConfig, config_path: PathBuf) -> Result<()> {
    use std::sync::Arc;

    use crate::automation::{
        control_loop, create_event_channel, run_recorder, Collaborators, LoopController,
        SendInputActuator,
    };
    use crate::capture::GdiCapturer;
    use crate::ocr::{ensure_tesseract, TesseractPaths, TesseractRecognizer};

    let tesseract = match ensure_tesseract(&config.ocr) {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!("Failed to setup Tesseract: {:#}", e);
            tracing::warn!("Every attempt will report a recognizer failure until it is installed.");
            TesseractPaths {
                executable: PathBuf::from("tesseract"),
                tessdata: None,
            }
        }
    };

    let collab = Collaborators {
        actuator: Arc::new(SendInputActuator::new()),
        capturer: Arc::new(GdiCapturer::new()),
        recognizer: Arc::new(TesseractRecognizer::new(tesseract, &config.ocr)),
    };

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let (events, event_rx) = create_event_channel();
    let (commands, command_rx) = tokio::sync::mpsc::channel(16);

    let recorder = runtime.spawn(run_recorder(event_rx, paths::get_output_dir()));
    let controller = LoopController::new(collab, events);
    let control = runtime.spawn(control_loop(command_rx, controller, config_path));

    tracing::info!(
        "Ready. {} = start, {} = preview, {} = stop, {} = record pointer as click step, {} = quit",
        config.hotkeys.start,
        config.hotkeys.preview,
        config.hotkeys.stop,
        config.hotkeys.capture,
        config.hotkeys.quit
    );

    // Returning drops the command sender, which ends the control loop
    let result = hotkey::run_hotkey_loop(&config.hotkeys, commands);

    runtime.block_on(async {
        if let Err(e) = control.await {
            tracing::error!("Control loop failed: {}", e);
        }
        if let Err(e) = recorder.await {
            tracing::error!("Recorder failed: {}", e);
        }
    });

    tracing::info!("Exiting");
    result
}

#[cfg(not(windows))]
fn run(_config: AppConfig, _config_path: PathBuf) -> Result<()> {
    tracing::error!("Input injection and screen capture are only implemented for Windows");
    Err(anyhow::anyhow!(
        "unsupported platform: input injection requires Windows"
    ))
}
