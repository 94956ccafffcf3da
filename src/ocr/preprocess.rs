use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};

/// Largest factor applied; bigger configured values are clamped.
pub const MAX_UPSCALE: u32 = 8;

/// Enlarges the capture and converts it to grayscale.
///
/// Game item names are often rendered at 10-14px, below what Tesseract reads
/// reliably; a 3x Lanczos upscale brings them into range.
pub fn prepare_for_ocr(img: &RgbaImage, upscale: u32) -> GrayImage {
    let factor = upscale.clamp(1, MAX_UPSCALE);
    let gray = imageops::grayscale(img);
    if factor == 1 {
        return gray;
    }

    let (w, h) = gray.dimensions();
    imageops::resize(
        &gray,
        w.saturating_mul(factor),
        h.saturating_mul(factor),
        FilterType::Lanczos3,
    )
}
