//! Nutrition facts parser. Pulls nutrient values out of OCR text with regex families.
//!
//! Each nutrient has several patterns, most specific first. Every match is scored
//! and the best-scoring match per nutrient wins:
//! - base 0.7
//! - +0.1 for a "total" pattern, +0.1 for a "dietary" pattern
//! - +0.05 per nutrition context keyword within 50 chars of the match
//! - −0.2 for values above 10 000, −0.1 for zero
//! - capped at 1.0

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::models::NutritionData;

const MIN_TEXT_LEN: usize = 10;
const CONTEXT_RADIUS: usize = 50;
const CONTEXT_KEYWORDS: &[&str] = &["nutrition", "facts", "serving", "daily", "value", "%"];

const NUM: &str = r"(?P<v>\d+(?:\.\d+)?)";
const SEP: &str = r"\s*:?\s*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nutrient {
    Calories,
    TotalFat,
    SaturatedFat,
    TransFat,
    Cholesterol,
    Sodium,
    TotalCarbohydrates,
    DietaryFiber,
    TotalSugars,
    AddedSugars,
    Protein,
    VitaminD,
    Calcium,
    Iron,
    Potassium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Kcal,
    Gram,
    Milligram,
    Microgram,
    InternationalUnit,
}

impl Unit {
    fn parse(raw: &str) -> Option<Unit> {
        match raw.to_lowercase().as_str() {
            "kcal" | "cal" => Some(Unit::Kcal),
            "g" => Some(Unit::Gram),
            "mg" => Some(Unit::Milligram),
            "mcg" | "µg" | "μg" | "ug" => Some(Unit::Microgram),
            "iu" => Some(Unit::InternationalUnit),
            _ => None,
        }
    }
}

impl Nutrient {
    /// Unit the value is stored in on `NutritionData`.
    fn standard_unit(self) -> Unit {
        match self {
            Nutrient::Calories => Unit::Kcal,
            Nutrient::Cholesterol
            | Nutrient::Sodium
            | Nutrient::Calcium
            | Nutrient::Iron
            | Nutrient::Potassium => Unit::Milligram,
            Nutrient::VitaminD => Unit::Microgram,
            _ => Unit::Gram,
        }
    }

    fn set(self, data: &mut NutritionData, value: f64) {
        let slot = match self {
            Nutrient::Calories => &mut data.calories,
            Nutrient::TotalFat => &mut data.total_fat,
            Nutrient::SaturatedFat => &mut data.saturated_fat,
            Nutrient::TransFat => &mut data.trans_fat,
            Nutrient::Cholesterol => &mut data.cholesterol,
            Nutrient::Sodium => &mut data.sodium,
            Nutrient::TotalCarbohydrates => &mut data.total_carbohydrates,
            Nutrient::DietaryFiber => &mut data.dietary_fiber,
            Nutrient::TotalSugars => &mut data.total_sugars,
            Nutrient::AddedSugars => &mut data.added_sugars,
            Nutrient::Protein => &mut data.protein,
            Nutrient::VitaminD => &mut data.vitamin_d,
            Nutrient::Calcium => &mut data.calcium,
            Nutrient::Iron => &mut data.iron,
            Nutrient::Potassium => &mut data.potassium,
        };
        *slot = Some(value);
    }
}

/// Converts between the mass units a label may use.
fn convert(value: f64, from: Unit, to: Unit) -> f64 {
    match (from, to) {
        (Unit::Gram, Unit::Milligram) => value * 1000.0,
        (Unit::Milligram, Unit::Gram) => value / 1000.0,
        (Unit::Milligram, Unit::Microgram) => value * 1000.0,
        (Unit::Microgram, Unit::Milligram) => value / 1000.0,
        // 1 µg vitamin D = 40 IU
        (Unit::InternationalUnit, Unit::Microgram) => value / 40.0,
        _ => value,
    }
}

struct NutrientPattern {
    regex: Regex,
    specificity_bonus: f64,
    /// Unit assumed when the label omits one.
    default_unit: Unit,
}

fn pattern(body: &str, default_unit: Unit) -> NutrientPattern {
    let lower = body.to_lowercase();
    let mut specificity_bonus = 0.0;
    if lower.contains("total") {
        specificity_bonus += 0.1;
    }
    if lower.contains("dietary") {
        specificity_bonus += 0.1;
    }
    let source = format!("(?i){}", body.replace("{N}", NUM).replace("{S}", SEP));
    NutrientPattern {
        regex: Regex::new(&source).expect("nutrient pattern must compile"),
        specificity_bonus,
        default_unit,
    }
}

static PATTERNS: Lazy<Vec<(Nutrient, Vec<NutrientPattern>)>> = Lazy::new(|| {
    use Nutrient::*;
    use Unit::*;
    vec![
        (
            Calories,
            vec![
                pattern(r"\bcalories?{S}{N}", Kcal),
                pattern(r"\benergy{S}{N}\s*kcal", Kcal),
                pattern(r"{N}\s*(?:kcal|cal(?:ories)?)\b", Kcal),
            ],
        ),
        (
            TotalFat,
            vec![
                pattern(r"\btotal\s*fat{S}{N}\s*(?P<u>mg|g)\b", Gram),
                pattern(r"\bfat{S}{N}\s*(?P<u>mg|g)\b", Gram),
                pattern(r"\btotal\s*fat{S}{N}", Gram),
            ],
        ),
        (
            SaturatedFat,
            vec![
                pattern(r"\bsaturated\s*fat{S}{N}\s*(?P<u>mg|g)\b", Gram),
                pattern(r"\bsaturated{S}{N}\s*(?P<u>mg|g)\b", Gram),
            ],
        ),
        (
            TransFat,
            vec![
                pattern(r"\btrans\s*fat{S}{N}\s*(?P<u>mg|g)\b", Gram),
                pattern(r"\btrans{S}{N}\s*(?P<u>mg|g)\b", Gram),
            ],
        ),
        (
            Cholesterol,
            vec![
                pattern(r"\bcholesterol{S}{N}\s*(?P<u>mg|g)\b", Milligram),
                pattern(r"\bcholesterol{S}{N}", Milligram),
            ],
        ),
        (
            Sodium,
            vec![
                pattern(r"\bsodium{S}{N}\s*(?P<u>mg|g)\b", Milligram),
                pattern(r"\bsodium{S}{N}", Milligram),
                pattern(r"\bsalt{S}{N}\s*(?P<u>g)\b", Gram),
            ],
        ),
        (
            TotalCarbohydrates,
            vec![
                pattern(r"\btotal\s*carbohydrates?{S}{N}\s*(?P<u>mg|g)\b", Gram),
                pattern(r"\btotal\s*carbs{S}{N}\s*(?P<u>mg|g)\b", Gram),
                pattern(r"\bcarbohydrates?{S}{N}\s*(?P<u>mg|g)\b", Gram),
                pattern(r"\bcarbs{S}{N}\s*(?P<u>mg|g)\b", Gram),
            ],
        ),
        (
            DietaryFiber,
            vec![
                pattern(r"\bdietary\s*fib(?:er|re){S}{N}\s*(?P<u>mg|g)\b", Gram),
                pattern(r"\bfib(?:er|re){S}{N}\s*(?P<u>mg|g)\b", Gram),
            ],
        ),
        (
            TotalSugars,
            vec![
                pattern(r"\btotal\s*sugars?{S}{N}\s*(?P<u>mg|g)\b", Gram),
                pattern(r"\bsugars?{S}{N}\s*(?P<u>mg|g)\b", Gram),
            ],
        ),
        (
            AddedSugars,
            vec![
                pattern(r"\badded\s*sugars?{S}{N}\s*(?P<u>mg|g)\b", Gram),
                pattern(r"\bincludes\s*{N}\s*(?P<u>g)\s*added\s*sugars?", Gram),
            ],
        ),
        (
            Protein,
            vec![
                pattern(r"\bprotein{S}{N}\s*(?P<u>mg|g)\b", Gram),
                pattern(r"\bprotein{S}{N}", Gram),
            ],
        ),
        (
            VitaminD,
            vec![
                pattern(r"\bvitamin\s*d{S}{N}\s*(?P<u>µg|μg|mcg|iu)", Microgram),
                pattern(r"\bvitamin\s*d{S}{N}", Microgram),
            ],
        ),
        (
            Calcium,
            vec![
                pattern(r"\bcalcium{S}{N}\s*(?P<u>mg|g)\b", Milligram),
                pattern(r"\bcalcium{S}{N}", Milligram),
            ],
        ),
        (
            Iron,
            vec![
                pattern(r"\biron{S}{N}\s*(?P<u>mg|g)\b", Milligram),
                pattern(r"\biron{S}{N}", Milligram),
            ],
        ),
        (
            Potassium,
            vec![
                pattern(r"\bpotassium{S}{N}\s*(?P<u>mg|g)\b", Milligram),
                pattern(r"\bpotassium{S}{N}", Milligram),
            ],
        ),
    ]
});

static SERVING_SIZE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bserving\s*size\s*:?\s*([0-9][0-9./]*\s*[a-z]+(?:\s*\([^)]*\))?)")
        .expect("serving size pattern must compile")
});

static OCR_MG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d)\s*(?:rng|rag)\b").expect("mg fix pattern must compile"));

/// A single scored match, kept only while choosing the best one.
#[derive(Debug, Clone)]
struct ParsedValue {
    value: f64,
    confidence: f64,
}

/// Parses nutrition data out of label text.
/// Returns `None` for text under 10 characters or when no nutrient is found.
pub fn parse_nutrition(text: &str) -> Option<NutritionData> {
    if text.trim().len() < MIN_TEXT_LEN {
        return None;
    }

    let cleaned = clean_text(text);
    let mut data = NutritionData::default();
    let mut found = 0usize;

    for (nutrient, patterns) in PATTERNS.iter() {
        if let Some(best) = best_match(&cleaned, *nutrient, patterns) {
            debug!(
                "Parsed {:?} = {} (confidence {:.2})",
                nutrient, best.value, best.confidence
            );
            nutrient.set(&mut data, best.value);
            found += 1;
        }
    }

    data.serving_size = SERVING_SIZE_RE
        .captures(&cleaned)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    if found == 0 {
        warn!("No nutrition values found in text");
        return None;
    }

    debug!("Parsed {found} nutrition values");
    Some(data)
}

fn clean_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let collapsed = collapsed.replace('|', "I");
    OCR_MG_RE.replace_all(&collapsed, "${1}mg").into_owned()
}

fn best_match(text: &str, nutrient: Nutrient, patterns: &[NutrientPattern]) -> Option<ParsedValue> {
    let mut best: Option<ParsedValue> = None;

    for pattern in patterns {
        for caps in pattern.regex.captures_iter(text) {
            let (Some(whole), Some(raw_value)) = (caps.get(0), caps.name("v")) else {
                continue;
            };
            let Ok(raw) = raw_value.as_str().parse::<f64>() else {
                continue;
            };
            let unit = caps
                .name("u")
                .and_then(|u| Unit::parse(u.as_str()))
                .unwrap_or(pattern.default_unit);
            let value = convert(raw, unit, nutrient.standard_unit());
            let confidence = match_confidence(
                text,
                whole.start(),
                whole.end(),
                raw,
                pattern.specificity_bonus,
            );

            if best.as_ref().map_or(true, |b| confidence > b.confidence) {
                best = Some(ParsedValue { value, confidence });
            }
        }
    }

    best
}

fn match_confidence(text: &str, start: usize, end: usize, raw_value: f64, bonus: f64) -> f64 {
    let mut confidence = 0.7 + bonus;

    let surrounding = char_window(text, start, end, CONTEXT_RADIUS).to_lowercase();
    confidence += CONTEXT_KEYWORDS
        .iter()
        .filter(|k| surrounding.contains(*k))
        .count() as f64
        * 0.05;

    if raw_value > 10_000.0 {
        confidence -= 0.2;
    } else if raw_value == 0.0 {
        confidence -= 0.1;
    }

    confidence.min(1.0)
}

/// Slice of `text` extending `radius` bytes around `[start, end)`, snapped to char boundaries.
fn char_window(text: &str, start: usize, end: usize, radius: usize) -> &str {
    let mut lo = start.saturating_sub(radius);
    while !text.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = (end + radius).min(text.len());
    while !text.is_char_boundary(hi) {
        hi += 1;
    }
    &text[lo..hi]
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NutritionValidation {
    pub is_valid: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Plausibility checks on parsed values.
pub fn validate_nutrition_data(data: &NutritionData) -> NutritionValidation {
    let mut result = NutritionValidation {
        is_valid: true,
        ..Default::default()
    };

    if data.calories.is_some_and(|v| v > 2000.0) {
        result.warnings.push("Very high calorie content".to_string());
    }
    if data.sodium.is_some_and(|v| v > 2000.0) {
        result.warnings.push("Very high sodium content".to_string());
    }
    if data.total_fat.is_some_and(|v| v > 100.0) {
        result.warnings.push("Unusually high fat content".to_string());
    }

    if let (Some(sat), Some(total)) = (data.saturated_fat, data.total_fat) {
        if sat > total {
            result
                .errors
                .push("Saturated fat cannot exceed total fat".to_string());
            result.is_valid = false;
        }
    }
    if let (Some(added), Some(total)) = (data.added_sugars, data.total_sugars) {
        if added > total {
            result
                .errors
                .push("Added sugars cannot exceed total sugars".to_string());
            result.is_valid = false;
        }
    }

    result
}
