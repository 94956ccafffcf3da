use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::automation::config::OcrConfig;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

/// Standard install locations of the UB-Mannheim Windows build.
const SYSTEM_INSTALL_DIRS: [&str; 2] = [
    r"C:\Program Files\Tesseract-OCR",
    r"C:\Program Files (x86)\Tesseract-OCR",
];

/// Where the recognizer finds its executable and language data.
#[derive(Debug, Clone, PartialEq)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    /// `None` lets tesseract use its compiled-in tessdata location
    pub tessdata: Option<PathBuf>,
}

/// Returns the directory for downloaded language data
pub fn get_tessdata_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ocr-autoclicker")
        .join("tessdata")
}

fn traineddata_name(language: &str) -> String {
    format!("{}.traineddata", language)
}

/// Locates Tesseract and makes sure the configured language is available.
///
/// Language data is copied from a system install or downloaded when it is
/// not already present in our data directory.
pub fn ensure_tesseract(config: &OcrConfig) -> Result<TesseractPaths> {
    let executable = find_tesseract_executable(config.tesseract_path.as_deref())?;
    tracing::info!("Tesseract found at: {}", executable.display());

    let tessdata_dir = get_tessdata_dir();
    let tessdata = match ensure_tessdata(&tessdata_dir, &config.language) {
        Ok(()) => Some(tessdata_dir),
        Err(e) => {
            tracing::warn!(
                "Language data for '{}' unavailable ({:#}); falling back to tesseract's default tessdata",
                config.language,
                e
            );
            None
        }
    };

    Ok(TesseractPaths {
        executable,
        tessdata,
    })
}

/// Finds the Tesseract executable: explicit path, then PATH, then system installs.
pub fn find_tesseract_executable(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = configured {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
        tracing::warn!("Configured tesseract_path {} does not exist", p.display());
    }

    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    for dir in &SYSTEM_INSTALL_DIRS {
        let p = Path::new(dir).join("tesseract.exe");
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "Tesseract not found. Install Tesseract-OCR \
         (https://github.com/UB-Mannheim/tesseract/releases) and add it to PATH, \
         or set ocr.tesseract_path in config.json"
    ))
}

/// Makes `<dir>/<language>.traineddata` exist.
pub fn ensure_tessdata(dir: &Path, language: &str) -> Result<()> {
    let target = dir.join(traineddata_name(language));
    if target.exists() {
        return Ok(());
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    for install in &SYSTEM_INSTALL_DIRS {
        let source = Path::new(install)
            .join("tessdata")
            .join(traineddata_name(language));
        if source.exists() {
            tracing::info!("Copying {} from: {}", traineddata_name(language), source.display());
            fs::copy(&source, &target)?;
            return Ok(());
        }
    }

    download_tessdata(&target, language)
}

/// Downloads language data from the upstream tessdata repository.
fn download_tessdata(target: &Path, language: &str) -> Result<()> {
    let url = format!("{}/{}", TESSDATA_REPO, traineddata_name(language));
    tracing::info!("Downloading {}...", url);

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let response = client
        .get(&url)
        .header("User-Agent", "ocr-autoclicker")
        .send()?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download {}: HTTP {}",
            traineddata_name(language),
            response.status()
        ));
    }

    let bytes = response.bytes()?;

    // Write to a temp name first so an interrupted download is never mistaken for a model
    let partial = target.with_extension("part");
    let mut file = fs::File::create(&partial)?;
    file.write_all(&bytes)?;
    drop(file);
    fs::rename(&partial, target)?;

    tracing::info!(
        "Downloaded {} ({} bytes)",
        traineddata_name(language),
        bytes.len()
    );

    Ok(())
}
