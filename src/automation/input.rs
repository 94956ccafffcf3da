//! Mouse input simulation and pixel sampling.
//!
//! `InputActuator` is the seam between the attempt loop and the OS. The
//! Windows implementation uses SendInput, which simulates hardware-level
//! input that games built on DirectInput/RawInput accept (window messages
//! posted with PostMessage are ignored by most of them).

use crate::automation::config::{Point, Rgb};
use crate::error::ActuatorError;

/// Pointer control, pixel reads and the emergency-stop sentinel.
pub trait InputActuator: Send + Sync {
    fn move_to(&self, point: Point) -> Result<(), ActuatorError>;

    /// Left click (two clicks when `double`) at `point`.
    fn click(&self, point: Point, double: bool) -> Result<(), ActuatorError>;

    fn read_pixel(&self, point: Point) -> Result<Rgb, ActuatorError>;

    /// Current pointer position in screen pixels.
    fn cursor_position(&self) -> Result<Point, ActuatorError>;

    /// True while the pointer sits in the top-left sentinel corner.
    fn emergency_stop_engaged(&self) -> bool;
}

/// The sentinel: pointer pushed into the top-left corner.
pub fn is_sentinel_position(point: Point) -> bool {
    point.x <= 0 && point.y <= 0
}

#[cfg(windows)]
pub use self::windows_impl::SendInputActuator;

#[cfg(windows)]
mod windows_impl {
    use std::time::Duration;

    use windows::Win32::Foundation::{HWND, POINT};
    use windows::Win32::Graphics::Gdi::{GetDC, GetPixel, ReleaseDC};
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_MOUSE, MOUSEEVENTF_ABSOLUTE, MOUSEEVENTF_LEFTDOWN,
        MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MOVE, MOUSE_EVENT_FLAGS, MOUSEINPUT,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetCursorPos, GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN,
    };

    use super::{is_sentinel_position, InputActuator};
    use crate::automation::config::{Point, Rgb};
    use crate::error::ActuatorError;

    /// GetPixel's failure value
    const CLR_INVALID: u32 = 0xFFFF_FFFF;

    /// SendInput-based actuator for the primary monitor.
    #[derive(Default)]
    pub struct SendInputActuator;

    impl SendInputActuator {
        pub fn new() -> Self {
            Self
        }
    }

    /// Normalizes screen pixels to the 0-65535 range MOUSEEVENTF_ABSOLUTE expects.
    fn normalize(point: Point) -> (i32, i32) {
        let screen_width = unsafe { GetSystemMetrics(SM_CXSCREEN) }.max(1);
        let screen_height = unsafe { GetSystemMetrics(SM_CYSCREEN) }.max(1);
        let norm_x = ((point.x as i64 * 65535) / screen_width as i64) as i32;
        let norm_y = ((point.y as i64 * 65535) / screen_height as i64) as i32;
        (norm_x, norm_y)
    }

    fn send(flags: MOUSE_EVENT_FLAGS, norm: (i32, i32)) -> Result<(), ActuatorError> {
        let input = INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx: norm.0,
                    dy: norm.1,
                    dwFlags: flags | MOUSEEVENTF_ABSOLUTE,
                    ..Default::default()
                },
            },
        };
        let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
        if sent == 0 {
            // Blocked by UIPI when the target runs elevated and we do not
            return Err(ActuatorError::Injection(
                windows::core::Error::from_win32().to_string(),
            ));
        }
        Ok(())
    }

    fn press(norm: (i32, i32)) -> Result<(), ActuatorError> {
        send(MOUSEEVENTF_LEFTDOWN | MOUSEEVENTF_MOVE, norm)?;
        std::thread::sleep(Duration::from_millis(20));
        send(MOUSEEVENTF_LEFTUP | MOUSEEVENTF_MOVE, norm)
    }

    impl InputActuator for SendInputActuator {
        fn move_to(&self, point: Point) -> Result<(), ActuatorError> {
            send(MOUSEEVENTF_MOVE, normalize(point))
        }

        fn click(&self, point: Point, double: bool) -> Result<(), ActuatorError> {
            let norm = normalize(point);
            send(MOUSEEVENTF_MOVE, norm)?;
            std::thread::sleep(Duration::from_millis(20));
            press(norm)?;
            if double {
                std::thread::sleep(Duration::from_millis(50));
                press(norm)?;
            }
            Ok(())
        }

        fn read_pixel(&self, point: Point) -> Result<Rgb, ActuatorError> {
            let screen = HWND::default();
            let color = unsafe {
                let hdc = GetDC(screen);
                if hdc.is_invalid() {
                    return Err(ActuatorError::PixelRead {
                        x: point.x,
                        y: point.y,
                        reason: "GetDC failed".to_string(),
                    });
                }
                let color = GetPixel(hdc, point.x, point.y);
                ReleaseDC(screen, hdc);
                color
            };

            if color.0 == CLR_INVALID {
                return Err(ActuatorError::PixelRead {
                    x: point.x,
                    y: point.y,
                    reason: "point is outside the visible screen".to_string(),
                });
            }

            // COLORREF layout: 0x00BBGGRR
            Ok(Rgb::new(
                (color.0 & 0xFF) as u8,
                ((color.0 >> 8) & 0xFF) as u8,
                ((color.0 >> 16) & 0xFF) as u8,
            ))
        }

        fn cursor_position(&self) -> Result<Point, ActuatorError> {
            let mut point = POINT::default();
            unsafe { GetCursorPos(&mut point) }
                .map_err(|e| ActuatorError::CursorQuery(e.to_string()))?;
            Ok(Point::new(point.x, point.y))
        }

        fn emergency_stop_engaged(&self) -> bool {
            match self.cursor_position() {
                Ok(point) => is_sentinel_position(point),
                Err(e) => {
                    tracing::warn!("Emergency stop check failed: {}", e);
                    false
                }
            }
        }
    }
}
