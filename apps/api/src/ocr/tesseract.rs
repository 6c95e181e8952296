use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::preprocess::{self, Preprocessing};
use super::{clean_extracted_text, image_hash, OcrEngine, OcrError, OcrResult};

/// Uniform text block; every prepared image is read with it first.
const PRIMARY_PSM: u8 = 6;
/// Single column, then sparse text, tried on the winning image only.
const FALLBACK_PSMS: [u8; 2] = [4, 11];

/// Runs the `tesseract` CLI in TSV mode over the raw upload and its
/// preprocessed variants, keeping the most confident reading.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    command: String,
    language: String,
}

impl TesseractOcr {
    pub fn new(command: String, language: String) -> Self {
        Self { command, language }
    }

    fn spawn_failed(&self, source: std::io::Error) -> OcrError {
        OcrError::Spawn {
            command: self.command.clone(),
            source,
        }
    }

    async fn run_mode(&self, image_path: &Path, psm: u8) -> Result<TsvText, OcrError> {
        let output = Command::new(&self.command)
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--oem")
            .arg("3")
            .arg("--psm")
            .arg(psm.to_string())
            .arg("tsv")
            .output()
            .await
            .map_err(|source| self.spawn_failed(source))?;

        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(text_from_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn temp_image(suffix: &str) -> std::io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix("label-")
        .suffix(suffix)
        .tempfile()
}

/// Writes the raw upload, plus every variant when the bytes decode, to temp files.
fn prepare_images(bytes: &[u8]) -> Result<Vec<(Preprocessing, NamedTempFile)>, OcrError> {
    let raw = temp_image(".img")?;
    std::fs::write(raw.path(), bytes)?;
    let mut prepared = vec![(Preprocessing::Original, raw)];

    match preprocess::decode(bytes) {
        Ok(decoded) => {
            for (variant, gray) in preprocess::variants(&decoded) {
                let file = temp_image(".png")?;
                gray.save_with_format(file.path(), image::ImageFormat::Png)?;
                prepared.push((variant, file));
            }
        }
        Err(e) => warn!("Image could not be decoded, reading it unprocessed: {e}"),
    }

    Ok(prepared)
}

#[derive(Debug)]
struct Candidate {
    variant: Preprocessing,
    psm: u8,
    result: TsvText,
}

/// Running tally of OCR passes.
#[derive(Debug, Default)]
struct Attempts {
    best: Option<Candidate>,
    last_error: Option<OcrError>,
}

impl Attempts {
    /// A spawn failure is returned at once; a missing binary fails every pass the same way.
    fn record(
        &mut self,
        variant: Preprocessing,
        psm: u8,
        outcome: Result<TsvText, OcrError>,
    ) -> Result<(), OcrError> {
        match outcome {
            Ok(result) if result.text.trim().is_empty() => {
                debug!("{} psm {psm} produced no text", variant.as_str());
            }
            Ok(result) => {
                debug!(
                    "{} psm {psm}: {} chars, confidence {:.2}",
                    variant.as_str(),
                    result.text.len(),
                    result.confidence
                );
                if self
                    .best
                    .as_ref()
                    .map_or(true, |b| result.confidence > b.result.confidence)
                {
                    self.best = Some(Candidate {
                        variant,
                        psm,
                        result,
                    });
                }
            }
            Err(e @ OcrError::Spawn { .. }) => return Err(e),
            Err(e) => {
                warn!("tesseract {} psm {psm} failed: {e}", variant.as_str());
                self.last_error = Some(e);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn extract(&self, image: &[u8]) -> Result<OcrResult, OcrError> {
        let started = Instant::now();
        let bytes = image.to_vec();
        let prepared = tokio::task::spawn_blocking(move || prepare_images(&bytes)).await??;

        let mut attempts = Attempts::default();
        for (variant, file) in &prepared {
            let outcome = self.run_mode(file.path(), PRIMARY_PSM).await;
            attempts.record(*variant, PRIMARY_PSM, outcome)?;
        }

        let winner = attempts.best.as_ref().map(|c| c.variant);
        if let Some((variant, file)) = prepared.iter().find(|(v, _)| Some(*v) == winner) {
            for psm in FALLBACK_PSMS {
                let outcome = self.run_mode(file.path(), psm).await;
                attempts.record(*variant, psm, outcome)?;
            }
        }

        let Some(Candidate {
            variant,
            psm,
            result,
        }) = attempts.best
        else {
            return Err(attempts.last_error.unwrap_or(OcrError::NoText));
        };

        let text = clean_extracted_text(&result.text);
        if text.is_empty() {
            return Err(OcrError::NoText);
        }

        let processing_ms = started.elapsed().as_millis() as u64;
        info!(
            "OCR extracted {} chars from {} image with psm {} (confidence {:.2}) in {}ms",
            text.len(),
            variant.as_str(),
            psm,
            result.confidence,
            processing_ms
        );

        Ok(OcrResult {
            text,
            confidence: result.confidence,
            method_used: format!("tesseract_{}_psm{psm}", variant.as_str()),
            preprocessing: variant,
            image_hash: image_hash(image),
            processing_ms,
        })
    }

    async fn health_check(&self) -> Result<String, OcrError> {
        let output = Command::new(&self.command)
            .arg("--version")
            .output()
            .await
            .map_err(|source| self.spawn_failed(source))?;

        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // Older releases print the banner on stderr.
        let banner = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        Ok(String::from_utf8_lossy(&banner)
            .lines()
            .next()
            .unwrap_or("tesseract")
            .trim()
            .to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TsvText {
    pub text: String,
    /// Mean confidence of words scored above 0, scaled to 0 to 1.
    pub confidence: f32,
}

/// Rebuilds reading-order text from `tesseract ... tsv` output.
///
/// Word rows (level 5) are joined with spaces within a line; a new
/// (block, paragraph, line) triple starts a new output line.
pub fn text_from_tsv(tsv: &str) -> TsvText {
    let mut lines: Vec<String> = Vec::new();
    let mut current_key: Option<(u32, u32, u32)> = None;
    let mut confidences: Vec<f32> = Vec::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }

        let num = |i: usize| cols[i].parse::<u32>().unwrap_or(0);
        let key = (num(2), num(3), num(4));

        match lines.last_mut() {
            Some(line) if current_key == Some(key) => {
                line.push(' ');
                line.push_str(word);
            }
            _ => {
                lines.push(word.to_string());
                current_key = Some(key);
            }
        }

        if let Ok(conf) = cols[10].parse::<f32>() {
            if conf > 0.0 {
                confidences.push(conf);
            }
        }
    }

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f32>() / confidences.len() as f32 / 100.0
    };

    TsvText {
        text: lines.join("\n"),
        confidence,
    }
}
