//! Text recognition for the captured region.
//!
//! Tesseract is invoked as an external process; this module locates it,
//! prepares the capture and parses its TSV output.

pub mod engine;
pub mod preprocess;
pub mod setup;

pub use engine::{OcrLine, OcrWord, TesseractRecognizer, TextRecognizer};
pub use setup::{ensure_tesseract, TesseractPaths};
