//! Screen capture for text recognition.
//!
//! This module provides:
//! - The `ScreenCapturer` seam used by the attempt loop
//! - A GDI implementation for Windows (`GdiCapturer`)

#[cfg(windows)]
pub mod screen;

use image::RgbaImage;

use crate::automation::config::Region;
use crate::error::RecognitionError;

#[cfg(windows)]
pub use screen::GdiCapturer;

/// Grabs a rectangle of the screen.
pub trait ScreenCapturer: Send + Sync {
    fn capture(&self, region: &Region) -> Result<RgbaImage, RecognitionError>;
}
