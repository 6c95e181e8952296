//! Image preparation for OCR: grayscale and binarized variants of the upload,
//! and a readability estimate for the validate endpoint.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::{box_filter, gaussian_blur_f32, laplacian_filter, median_filter};
use imageproc::morphology::close;
use serde::Serialize;

use super::OcrError;

/// Sigma matching a 5x5 Gaussian kernel.
const BLUR_SIGMA: f32 = 1.1;
/// 11x11 neighbourhood for the local mean.
const ADAPTIVE_RADIUS: u32 = 5;
const ADAPTIVE_OFFSET: i16 = 2;
/// Below this on either side the label text is usually too small.
const MIN_READABLE_SIDE: u32 = 300;
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Preprocessing {
    Original,
    Grayscale,
    GaussianOtsu,
    Adaptive,
    Morphological,
    Denoised,
    Edges,
}

impl Preprocessing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Preprocessing::Original => "original",
            Preprocessing::Grayscale => "grayscale",
            Preprocessing::GaussianOtsu => "gaussian_otsu",
            Preprocessing::Adaptive => "adaptive",
            Preprocessing::Morphological => "morphological",
            Preprocessing::Denoised => "denoised",
            Preprocessing::Edges => "edges",
        }
    }

    pub fn steps(&self) -> &'static [&'static str] {
        match self {
            Preprocessing::Original => &["none"],
            Preprocessing::Grayscale => &["grayscale"],
            Preprocessing::GaussianOtsu => &["grayscale", "gaussian_blur", "otsu_threshold"],
            Preprocessing::Adaptive => &["grayscale", "adaptive_threshold"],
            Preprocessing::Morphological => &[
                "grayscale",
                "gaussian_blur",
                "otsu_threshold",
                "morphological_close",
            ],
            Preprocessing::Denoised => &["grayscale", "median_blur", "otsu_threshold"],
            Preprocessing::Edges => &["grayscale", "canny_edges"],
        }
    }
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, OcrError> {
    Ok(image::load_from_memory(bytes)?)
}

/// Pixels above `level` become white, the rest black.
fn binarize(image: &GrayImage, level: u8) -> GrayImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel.0[0] = if pixel.0[0] > level { 255 } else { 0 };
    }
    out
}

/// Local-mean threshold: white where the pixel beats its neighbourhood mean minus `offset`.
fn adaptive_threshold(gray: &GrayImage, radius: u32, offset: i16) -> GrayImage {
    let means = box_filter(gray, radius, radius);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let value = i16::from(gray.get_pixel(x, y).0[0]);
        let mean = i16::from(means.get_pixel(x, y).0[0]);
        Luma([if value > mean - offset { 255 } else { 0 }])
    })
}

/// Every processed variant, in the order OCR tries them.
pub fn variants(image: &DynamicImage) -> Vec<(Preprocessing, GrayImage)> {
    let gray = image.to_luma8();

    let blurred = gaussian_blur_f32(&gray, BLUR_SIGMA);
    let otsu = binarize(&blurred, otsu_level(&blurred));
    let morphological = close(&otsu, Norm::LInf, 1);

    let median = median_filter(&gray, 1, 1);
    let denoised = binarize(&median, otsu_level(&median));

    let adaptive = adaptive_threshold(&gray, ADAPTIVE_RADIUS, ADAPTIVE_OFFSET);
    let edges = canny(&gray, CANNY_LOW, CANNY_HIGH);

    vec![
        (Preprocessing::Grayscale, gray),
        (Preprocessing::GaussianOtsu, otsu),
        (Preprocessing::Adaptive, adaptive),
        (Preprocessing::Morphological, morphological),
        (Preprocessing::Denoised, denoised),
        (Preprocessing::Edges, edges),
    ]
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageQuality {
    pub width: u32,
    pub height: u32,
    /// 0 to 1, higher is more OCR-friendly.
    pub score: f64,
    /// Intensity standard deviation over 255.
    pub contrast: f64,
    /// Laplacian variance over 10 000, capped at 1.
    pub sharpness: f64,
    /// Mean intensity over 255.
    pub brightness: f64,
    /// Standard deviation of the blur residual, in grey levels.
    pub noise: f64,
    pub issues: Vec<String>,
}

fn mean_std(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (count, sum, sum_sq) = values.fold((0usize, 0.0, 0.0), |(n, s, sq), v| {
        (n + 1, s + v, sq + v * v)
    });
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

/// Weighted blend of contrast (0.3), sharpness (0.3), mid-range brightness (0.2)
/// and low noise (0.2).
pub fn assess_quality(image: &DynamicImage) -> ImageQuality {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();

    let (mean, std) = mean_std(gray.pixels().map(|p| f64::from(p.0[0])));
    let contrast = std / 255.0;

    let laplacian = laplacian_filter(&gray);
    let (_, laplacian_std) = mean_std(laplacian.pixels().map(|p| f64::from(p.0[0])));
    let sharpness = (laplacian_std * laplacian_std / 10_000.0).min(1.0);

    let brightness = mean / 255.0;
    let brightness_score = 1.0 - (brightness - 0.5).abs() * 2.0;

    let blurred = gaussian_blur_f32(&gray, BLUR_SIGMA);
    let (_, noise) = mean_std(
        blurred
            .pixels()
            .zip(gray.pixels())
            .map(|(b, g)| f64::from(b.0[0]) - f64::from(g.0[0])),
    );
    let noise_score = (1.0 - noise / 50.0).max(0.0);

    let score = (contrast * 0.3 + sharpness * 0.3 + brightness_score * 0.2 + noise_score * 0.2)
        .clamp(0.0, 1.0);

    let mut issues = Vec::new();
    if width < MIN_READABLE_SIDE || height < MIN_READABLE_SIDE {
        issues.push(format!(
            "Low resolution ({width}x{height}); label text may be too small"
        ));
    }
    if contrast < 0.15 {
        issues.push("Low contrast".to_string());
    }
    if sharpness < 0.05 {
        issues.push("Image appears blurry".to_string());
    }
    if brightness < 0.25 {
        issues.push("Image is too dark".to_string());
    } else if brightness > 0.9 {
        issues.push("Image is overexposed".to_string());
    }
    if noise_score < 0.5 {
        issues.push("Image is noisy".to_string());
    }

    ImageQuality {
        width,
        height,
        score,
        contrast,
        sharpness,
        brightness,
        noise,
        issues,
    }
}

/// Decodes and assesses in one go, for callers holding raw upload bytes.
pub fn assess_bytes(bytes: &[u8]) -> Result<ImageQuality, OcrError> {
    Ok(assess_quality(&decode(bytes)?))
}
