//! Deterministic scores derived from parsed nutrition and detected additives.

use crate::analysis::models::{ChemicalAnalysis, NutritionData, RecommendationType, RiskLevel};

fn above(value: Option<f64>, limit: f64) -> bool {
    value.is_some_and(|v| v > limit)
}

/// Nutrition score, 0 to 10 (higher is better). 5.0 when nothing was parsed.
pub fn nutrition_score(nutrition: Option<&NutritionData>) -> f64 {
    let Some(n) = nutrition else {
        return 5.0;
    };

    let mut score = 7.0;

    if above(n.sodium, 600.0) {
        score -= 1.0;
    }
    if above(n.total_sugars, 15.0) {
        score -= 1.0;
    }
    if above(n.saturated_fat, 5.0) {
        score -= 0.5;
    }
    if above(n.trans_fat, 0.0) {
        score -= 2.0;
    }

    if above(n.dietary_fiber, 3.0) {
        score += 0.5;
    }
    if above(n.protein, 10.0) {
        score += 0.5;
    }

    f64::clamp(score, 0.0, 10.0)
}

/// NOVI nutrition quality index, 0 to 100.
pub fn novi_score(nutrition: Option<&NutritionData>, chemicals: &ChemicalAnalysis) -> f64 {
    let mut score = 50.0;

    if let Some(n) = nutrition {
        if above(n.dietary_fiber, 5.0) {
            score += 10.0;
        }
        if above(n.protein, 15.0) {
            score += 10.0;
        }
        if above(n.sodium, 800.0) {
            score -= 15.0;
        }
        if above(n.total_sugars, 20.0) {
            score -= 15.0;
        }
    }

    score += match chemicals.overall_risk_level {
        RiskLevel::Low => 0.0,
        RiskLevel::Medium => -5.0,
        RiskLevel::High => -15.0,
        RiskLevel::Critical => -25.0,
    };

    f64::clamp(score, 0.0, 100.0)
}

pub fn recommendation_type(nutrition_score: f64, risk: RiskLevel) -> RecommendationType {
    if risk == RiskLevel::Critical || nutrition_score < 3.0 {
        RecommendationType::Avoid
    } else if risk == RiskLevel::High || nutrition_score < 5.0 {
        RecommendationType::Limit
    } else {
        RecommendationType::Consume
    }
}

/// Mean of text-length, nutrition-coverage and detection factors, 0 to 1.
pub fn overall_confidence(
    text: &str,
    nutrition: Option<&NutritionData>,
    chemicals: &ChemicalAnalysis,
) -> f64 {
    let length = text.chars().count();
    let text_factor = if length > 100 {
        0.8
    } else if length > 50 {
        0.6
    } else {
        0.3
    };

    let nutrition_factor = match nutrition {
        Some(n) => (n.populated_fields() as f64 / 10.0).min(1.0),
        None => 0.2,
    };

    let chemical_factor = if chemicals.detected_chemicals.is_empty() {
        0.7
    } else {
        0.9
    };

    (text_factor + nutrition_factor + chemical_factor) / 3.0
}
