//! Global hotkeys mapped to control commands.

use crate::error::ConfigError;

/// A parsed key combination such as `Ctrl+Shift+F6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeySpec {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    /// Windows virtual-key code
    pub vk: u32,
}

fn invalid(spec: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidHotkey {
        spec: spec.to_string(),
        reason: reason.to_string(),
    }
}

/// Virtual-key code for `F1`-`F24`, `A`-`Z` or `0`-`9`.
fn key_code(key: &str) -> Option<u32> {
    let upper = key.to_ascii_uppercase();

    if let Some(n) = upper.strip_prefix('F').and_then(|n| n.parse::<u32>().ok()) {
        return (1..=24).contains(&n).then_some(0x70 + n - 1);
    }

    let mut chars = upper.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_uppercase() || c.is_ascii_digit() => Some(c as u32),
        _ => None,
    }
}

/// Parses "Ctrl+Shift+F6"-style strings (case-insensitive).
pub fn parse_hotkey(spec: &str) -> Result<HotkeySpec, ConfigError> {
    let mut parsed = HotkeySpec {
        ctrl: false,
        shift: false,
        alt: false,
        vk: 0,
    };
    let mut key = None;

    for part in spec.split('+').map(str::trim) {
        match part.to_ascii_lowercase().as_str() {
            "" => return Err(invalid(spec, "empty key name")),
            "ctrl" | "control" => parsed.ctrl = true,
            "shift" => parsed.shift = true,
            "alt" => parsed.alt = true,
            _ => {
                if key.is_some() {
                    return Err(invalid(spec, "more than one key"));
                }
                key = Some(key_code(part).ok_or_else(|| invalid(spec, "unknown key"))?);
            }
        }
    }

    parsed.vk = key.ok_or_else(|| invalid(spec, "no key, only modifiers"))?;
    Ok(parsed)
}

#[cfg(windows)]
pub use self::windows_impl::run_hotkey_loop;

#[cfg(windows)]
mod windows_impl {
    use anyhow::{Context, Result};
    use tokio::sync::mpsc::Sender;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        RegisterHotKey, UnregisterHotKey, MOD_ALT, MOD_CONTROL, MOD_NOREPEAT, MOD_SHIFT,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetMessageW, MSG, WM_HOTKEY};

    use super::parse_hotkey;
    use crate::automation::config::HotkeyConfig;
    use crate::automation::runner::ControlCommand;

    /// Registers the configured hotkeys on the calling thread and forwards
    /// presses as commands until quit is pressed or the receiver is gone.
    ///
    /// Blocks; run it on a dedicated thread (the main thread in practice).
    pub fn run_hotkey_loop(config: &HotkeyConfig, commands: Sender<ControlCommand>) -> Result<()> {
        let bindings = [
            (1, config.start.as_str(), ControlCommand::Start),
            (2, config.preview.as_str(), ControlCommand::Preview),
            (3, config.stop.as_str(), ControlCommand::Stop),
            (4, config.quit.as_str(), ControlCommand::Shutdown),
            (5, config.capture.as_str(), ControlCommand::Capture),
        ];

        let mut registered = Vec::new();
        let result = (|| -> Result<()> {
            for (id, spec, command) in &bindings {
                let hotkey = parse_hotkey(spec)?;
                let mut modifiers = MOD_NOREPEAT;
                if hotkey.ctrl {
                    modifiers |= MOD_CONTROL;
                }
                if hotkey.shift {
                    modifiers |= MOD_SHIFT;
                }
                if hotkey.alt {
                    modifiers |= MOD_ALT;
                }
                unsafe { RegisterHotKey(HWND::default(), *id, modifiers, hotkey.vk) }
                    .with_context(|| format!("Failed to register hotkey {} ({:?})", spec, command))?;
                registered.push(*id);
                tracing::info!("Hotkey {}: {:?}", spec, command);
            }

            let mut msg = MSG::default();
            while unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) }.as_bool() {
                if msg.message != WM_HOTKEY {
                    continue;
                }
                let id = msg.wParam.0 as i32;
                let Some((_, _, command)) = bindings.iter().find(|(bid, _, _)| *bid == id) else {
                    continue;
                };
                if commands.blocking_send(*command).is_err() {
                    tracing::warn!("Control loop is gone; leaving hotkey loop");
                    break;
                }
                if *command == ControlCommand::Shutdown {
                    break;
                }
            }
            Ok(())
        })();

        for id in registered {
            let _ = unsafe { UnregisterHotKey(HWND::default(), id) };
        }
        result
    }
}
