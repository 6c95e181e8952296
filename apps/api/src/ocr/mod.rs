//! Text extraction from label images.
//!
//! `TesseractOcr` shells out to the `tesseract` CLI; `SampleOcr` returns canned
//! labels keyed by image hash for demo deployments and tests.
//! `AppState` holds an `Arc<dyn OcrEngine>`, chosen at startup via config.

pub mod preprocess;
pub mod sample;
pub mod tesseract;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::errors::AppError;

pub use preprocess::{ImageQuality, Preprocessing};
pub use sample::SampleOcr;
pub use tesseract::TesseractOcr;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("failed to prepare image file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to run OCR command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OCR command exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("could not process image: {0}")]
    Image(#[from] image::ImageError),

    #[error("image preprocessing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("no text could be extracted from the image")]
    NoText,
}

impl From<OcrError> for AppError {
    fn from(e: OcrError) -> Self {
        match e {
            OcrError::NoText => AppError::UnprocessableEntity(
                "No text could be extracted from the image. Try a clearer photo of the label."
                    .to_string(),
            ),
            other => AppError::Ocr(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OcrResult {
    pub text: String,
    /// Mean word confidence, 0 to 1.
    pub confidence: f32,
    pub method_used: String,
    /// Which prepared variant of the image produced `text`.
    pub preprocessing: Preprocessing,
    pub image_hash: String,
    pub processing_ms: u64,
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// "tesseract" | "sample"
    fn name(&self) -> &'static str;

    async fn extract(&self, image: &[u8]) -> Result<OcrResult, OcrError>;

    /// Confirms the engine can run; returns its version string.
    async fn health_check(&self) -> Result<String, OcrError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }
}

/// Identifies the image by its magic bytes.
pub fn detect_image_format(bytes: &[u8]) -> Option<ImageFormat> {
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];

    if bytes.starts_with(PNG) {
        Some(ImageFormat::Png)
    } else if bytes.starts_with(JPEG) {
        Some(ImageFormat::Jpeg)
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some(ImageFormat::Webp)
    } else {
        None
    }
}

/// Lower-case SHA-256 hex digest.
pub fn image_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

static MG_MISREAD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(?:rng|rag)\b").expect("mg pattern must compile"));
static G_MISREAD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s+9(\s|$)").expect("g pattern must compile"));
static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s+%").expect("percent pattern must compile"));
static CALORIES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bcalories?\s*(\d+)").expect("calories pattern must compile"));

/// Normalizes raw OCR output: collapses runs of spaces within each line, drops blank lines,
/// fixes `|` -> `I`, `rng`/`rag` -> `mg`, a detached `9` -> `g`, and `Calorie N` -> `Calories N`.
pub fn clean_extracted_text(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .map(|line| {
            let line = line.replace('|', "I");
            let line = MG_MISREAD_RE.replace_all(&line, "${1}mg");
            let line = G_MISREAD_RE.replace_all(&line, "${1}g${2}");
            let line = PERCENT_RE.replace_all(&line, "${1}%");
            CALORIES_RE.replace_all(&line, "Calories ${1}").into_owned()
        })
        .collect();
    lines.join("\n")
}

const NUTRITION_KEYWORDS: [&str; 11] = [
    "calories",
    "fat",
    "protein",
    "carbohydrate",
    "sodium",
    "sugar",
    "vitamin",
    "mineral",
    "serving",
    "nutrition",
    "facts",
];

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("number pattern must compile"));

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExtractionValidation {
    pub is_valid: bool,
    /// Share of nutrition keywords found, 0 to 1.
    pub confidence: f64,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Judges whether extracted text looks like a nutrition label.
pub fn validate_extraction(text: &str) -> ExtractionValidation {
    let mut validation = ExtractionValidation {
        is_valid: false,
        confidence: 0.0,
        issues: vec![],
        suggestions: vec![],
    };

    if text.trim().chars().count() < 10 {
        validation.issues.push("Text too short".to_string());
        validation.suggestions.push("Try a clearer image".to_string());
        return validation;
    }

    let lower = text.to_lowercase();
    let found = NUTRITION_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .count();

    if found >= 3 {
        validation.is_valid = true;
        validation.confidence = (found as f64 / NUTRITION_KEYWORDS.len() as f64).min(1.0);
    } else {
        validation
            .issues
            .push("Few nutrition-related terms found".to_string());
        validation
            .suggestions
            .push("Ensure image shows nutrition facts label".to_string());
    }

    if NUMBER_RE.find_iter(text).count() < 5 {
        validation
            .issues
            .push("Few numeric values detected".to_string());
        validation
            .suggestions
            .push("Ensure nutrition values are clearly visible".to_string());
    }

    validation
}
