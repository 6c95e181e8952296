use async_trait::async_trait;

use super::{clean_extracted_text, image_hash, OcrEngine, OcrError, OcrResult, Preprocessing};

/// Canned labels served by `SampleOcr`: a processed snack, a granola bar and a soda.
pub const SAMPLE_LABELS: [&str; 3] = [
    "Nutrition Facts
Serving Size: 1 package (28g)
Calories: 140
Total Fat: 7g
Saturated Fat: 1g
Sodium: 230mg
Total Carbs: 18g
Sugars: 10g
Protein: 2g

Ingredients: Enriched flour, high fructose corn syrup, vegetable oil, salt, artificial flavor, yellow 6, red 40, BHT",
    "Nutrition Facts
Serving Size: 1 bar (40g)
Calories: 180
Total Fat: 8g
Saturated Fat: 2g
Sodium: 95mg
Total Carbs: 22g
Fiber: 6g
Sugars: 8g
Protein: 7g

Ingredients: Organic oats, almonds, honey, organic coconut oil, sea salt, natural vanilla",
    "Nutrition Facts
Serving Size: 1 can (355ml)
Calories: 150
Total Fat: 0g
Sodium: 35mg
Total Carbs: 39g
Sugars: 39g
Protein: 0g

Ingredients: Carbonated water, high fructose corn syrup, caramel color, phosphoric acid, natural flavor, caffeine",
];

const SAMPLE_CONFIDENCE: f32 = 0.95;

/// Demo OCR: the same image always yields the same canned label.
#[derive(Debug, Clone, Default)]
pub struct SampleOcr;

/// Index into `SAMPLE_LABELS` from the first four hex digits of the hash.
pub fn sample_index(hash: &str) -> usize {
    let prefix = hash.get(..4).unwrap_or("0");
    usize::from_str_radix(prefix, 16).unwrap_or(0) % SAMPLE_LABELS.len()
}

#[async_trait]
impl OcrEngine for SampleOcr {
    fn name(&self) -> &'static str {
        "sample"
    }

    async fn extract(&self, image: &[u8]) -> Result<OcrResult, OcrError> {
        if image.is_empty() {
            return Err(OcrError::NoText);
        }
        let hash = image_hash(image);
        let index = sample_index(&hash);
        Ok(OcrResult {
            text: clean_extracted_text(SAMPLE_LABELS[index]),
            confidence: SAMPLE_CONFIDENCE,
            method_used: format!("sample_{index}"),
            preprocessing: Preprocessing::Original,
            image_hash: hash,
            processing_ms: 0,
        })
    }

    async fn health_check(&self) -> Result<String, OcrError> {
        Ok(format!("sample ({} labels)", SAMPLE_LABELS.len()))
    }
}
