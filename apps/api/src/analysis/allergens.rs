//! Profile matching: allergens, health conditions and dietary restrictions.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::analysis::models::{NutritionData, UserProfile};

/// Flags every profile allergen whose lower-cased form occurs in the lower-cased text.
pub fn check_allergens(text: &str, profile: Option<&UserProfile>) -> Vec<String> {
    let Some(profile) = profile else {
        return vec![];
    };
    let text_lower = text.to_lowercase();

    profile
        .allergies
        .iter()
        .filter(|allergen| !allergen.trim().is_empty())
        .filter(|allergen| text_lower.contains(&allergen.to_lowercase()))
        .map(|allergen| format!("Contains {} - matches your allergy profile", allergen))
        .collect()
}

pub fn check_health_conditions(
    nutrition: Option<&NutritionData>,
    profile: Option<&UserProfile>,
) -> Vec<String> {
    let (Some(nutrition), Some(profile)) = (nutrition, profile) else {
        return vec![];
    };

    let conditions: Vec<String> = profile
        .health_conditions
        .iter()
        .map(|c| c.trim().to_lowercase())
        .collect();
    let has = |name: &str| conditions.iter().any(|c| c == name);
    let above = |value: Option<f64>, limit: f64| value.is_some_and(|v| v > limit);

    let mut warnings = Vec::new();

    if has("diabetes") {
        if above(nutrition.total_sugars, 15.0) {
            warnings.push("High sugar content - monitor blood glucose".to_string());
        }
        if above(nutrition.total_carbohydrates, 30.0) {
            warnings.push("High carbohydrate content - consider portion size".to_string());
        }
    }

    if (has("hypertension") || has("high blood pressure")) && above(nutrition.sodium, 400.0) {
        warnings.push("High sodium content - may affect blood pressure".to_string());
    }

    if has("heart disease") {
        if above(nutrition.saturated_fat, 3.0) {
            warnings.push("High saturated fat - consider heart-healthy alternatives".to_string());
        }
        if above(nutrition.trans_fat, 0.0) {
            warnings.push("Contains trans fat - avoid for heart health".to_string());
        }
    }

    warnings
}

const DIET_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "vegan",
        &[
            "milk", "whey", "casein", "egg", "honey", "gelatin", "butter", "cream", "cheese",
            "lard", "beef", "chicken", "pork", "fish",
        ],
    ),
    (
        "vegetarian",
        &["gelatin", "beef", "chicken", "pork", "fish", "lard", "anchovy"],
    ),
    (
        "gluten-free",
        &["wheat", "barley", "rye", "malt", "gluten", "spelt"],
    ),
    (
        "dairy-free",
        &["milk", "whey", "casein", "butter", "cream", "cheese", "lactose", "yogurt"],
    ),
    (
        "nut-free",
        &["peanut", "almond", "cashew", "walnut", "hazelnut", "pecan", "pistachio"],
    ),
];

/// Keywords compiled as word-prefix patterns so plurals ("eggs", "peanuts") still match.
static DIET_PATTERNS: Lazy<Vec<(&'static str, Vec<(&'static str, Regex)>)>> = Lazy::new(|| {
    DIET_KEYWORDS
        .iter()
        .map(|(diet, keywords)| {
            let compiled = keywords
                .iter()
                .map(|kw| {
                    let re = Regex::new(&format!(r"\b{}", regex::escape(kw)))
                        .expect("escaped keyword must compile");
                    (*kw, re)
                })
                .collect();
            (*diet, compiled)
        })
        .collect()
});

/// "Gluten Free" / "gluten_free" -> "gluten-free".
fn normalize_restriction(restriction: &str) -> String {
    restriction
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// One warning per declared restriction the text conflicts with, listing the offending words.
/// Restrictions without a keyword list are ignored.
pub fn check_dietary_restrictions(text: &str, profile: Option<&UserProfile>) -> Vec<String> {
    let Some(profile) = profile else {
        return vec![];
    };
    let text_lower = text.to_lowercase();

    let mut warnings = Vec::new();
    for restriction in &profile.dietary_restrictions {
        let normalized = normalize_restriction(restriction);
        let Some((diet, patterns)) = DIET_PATTERNS.iter().find(|(d, _)| *d == normalized) else {
            continue;
        };
        let offending: Vec<&str> = patterns
            .iter()
            .filter(|(_, re)| re.is_match(&text_lower))
            .map(|(kw, _)| *kw)
            .collect();
        if !offending.is_empty() {
            warnings.push(format!(
                "Not suitable for a {} diet - contains {}",
                diet,
                offending.join(", ")
            ));
        }
    }
    warnings
}
