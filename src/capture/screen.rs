//! Screen region capture using GDI.
//!
//! BitBlt copies the region from the screen DC into a memory bitmap, which is
//! read back as a top-down 32-bit DIB and converted from BGRA to RGBA.

use image::{ImageBuffer, Rgba, RgbaImage};

use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, SRCCOPY,
};

use super::ScreenCapturer;
use crate::automation::config::Region;
use crate::error::RecognitionError;

/// Captures from the virtual screen with GDI.
#[derive(Default)]
pub struct GdiCapturer;

impl GdiCapturer {
    pub fn new() -> Self {
        Self
    }
}

impl ScreenCapturer for GdiCapturer {
    fn capture(&self, region: &Region) -> Result<RgbaImage, RecognitionError> {
        capture_screen_region(region)
    }
}

/// Captures `region` of the screen as an RGBA image.
pub fn capture_screen_region(region: &Region) -> Result<RgbaImage, RecognitionError> {
    if region.is_empty() {
        return Err(RecognitionError::Capture(format!(
            "empty region {}x{}",
            region.width, region.height
        )));
    }

    let width = region.width as i32;
    let height = region.height as i32;
    let screen = HWND::default();

    let mut bgra = vec![0u8; region.width as usize * region.height as usize * 4];

    let copied = unsafe {
        let screen_dc = GetDC(screen);
        if screen_dc.is_invalid() {
            return Err(RecognitionError::Capture("GetDC failed".to_string()));
        }
        let mem_dc = CreateCompatibleDC(screen_dc);
        let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
        let previous = SelectObject(mem_dc, bitmap);

        let blit = BitBlt(
            mem_dc, 0, 0, width, height, screen_dc, region.x, region.y, SRCCOPY,
        );

        let mut info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width,
                // Negative height = top-down rows
                biHeight: -height,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };

        let lines = if blit.is_ok() {
            GetDIBits(
                mem_dc,
                bitmap,
                0,
                height as u32,
                Some(bgra.as_mut_ptr() as *mut _),
                &mut info,
                DIB_RGB_COLORS,
            )
        } else {
            0
        };

        SelectObject(mem_dc, previous);
        let _ = DeleteObject(bitmap);
        let _ = DeleteDC(mem_dc);
        ReleaseDC(screen, screen_dc);

        blit.map_err(|e| RecognitionError::Capture(format!("BitBlt failed: {}", e)))?;
        lines
    };

    if copied != height {
        return Err(RecognitionError::Capture(format!(
            "GetDIBits copied {} of {} rows",
            copied, height
        )));
    }

    bgra_to_rgba(bgra, region.width, region.height)
}

/// Swaps the B and R channels and forces opaque alpha.
fn bgra_to_rgba(mut data: Vec<u8>, width: u32, height: u32) -> Result<RgbaImage, RecognitionError> {
    for px in data.chunks_exact_mut(4) {
        px.swap(0, 2);
        px[3] = 255;
    }
    ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, data)
        .ok_or_else(|| RecognitionError::Capture("pixel buffer size mismatch".to_string()))
}
