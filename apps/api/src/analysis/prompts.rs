// LLM prompt constants and builders for label analysis.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::analysis::models::{ChemicalAnalysis, NutritionData, UserProfile};
use crate::errors::AppError;
use crate::llm_client::prompts::{EVIDENCE_INSTRUCTION, JSON_ONLY_SYSTEM, MEDICAL_SCOPE_INSTRUCTION};

/// Label text beyond this many characters is cut before prompting.
pub const MAX_PROMPT_TEXT_CHARS: usize = 1000;

pub const NUTRITION_PLACEHOLDER: &str = "Not available";
pub const PROFILE_PLACEHOLDER: &str = "Not provided";

/// Persona for structured label analysis; combined with the JSON-only rules by `analysis_system`.
pub const ANALYSIS_PERSONA: &str = "You are a professional nutritionist and food safety expert.";

/// Structured analysis prompt, filled by `fill_template`.
/// Placeholders: {evidence_instruction}, {medical_scope}, {nutrition_json},
///               {chemicals_json}, {profile_json}, {label_text}
pub const ANALYSIS_PROMPT_TEMPLATE: &str = r#"Analyze this food product and provide comprehensive recommendations.

{evidence_instruction}
{medical_scope}

### PARSED NUTRITION DATA:
{nutrition_json}

### DETECTED CHEMICALS:
{chemicals_json}

### USER HEALTH PROFILE:
{profile_json}

### ANALYSIS REQUIREMENTS:
Return a JSON object with this structure:
{
  "benefits": ["list of health benefits"],
  "risks": ["list of potential health risks"],
  "alternatives": ["list of healthier alternatives"],
  "tips": ["list of consumption tips"],
  "portion_size": "recommended portion size",
  "frequency": "recommended consumption frequency",
  "health_score": 6.5
}

### ANALYSIS GUIDELINES:
1. Consider the user's specific health profile (allergies, conditions, restrictions)
2. Evaluate both nutritional content and chemical additives
3. Be specific about portion sizes and frequency
4. Suggest realistic alternatives
5. health_score is optional: a number from 0 to 10 where 10 is healthiest

### EXTRACTED NUTRITION LABEL TEXT:
{label_text}"#;

/// System prompt for the free-text quick assessment.
pub const QUICK_SYSTEM: &str = "You are a concise nutrition assistant. \
    Answer in plain text, not JSON.";

/// Quick assessment prompt. Replace: {label_text}
pub const QUICK_PROMPT_TEMPLATE: &str = r#"Analyze this nutrition information and provide a health assessment:

{label_text}

Please provide:
1. Health score (1-10, where 10 is healthiest)
2. Main health concerns
3. Detected harmful chemicals or additives
4. Recommendation (consume/limit/avoid)
5. Brief explanation

Keep response concise and practical."#;

/// Cuts `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Substitutes `{key}` placeholders in one left-to-right pass.
/// Substituted values are never rescanned, so user text containing
/// `{label_text}` or similar stays literal. Unknown `{...}` spans are kept as-is.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let filled = after.find('}').and_then(|end| {
            let key = &after[..end];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, value)| (end, *value))
        });
        match filled {
            Some((end, value)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<String, AppError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize {what}: {e}")))
}

pub fn build_analysis_prompt(
    text: &str,
    nutrition: Option<&NutritionData>,
    chemicals: &ChemicalAnalysis,
    profile: Option<&UserProfile>,
) -> Result<String, AppError> {
    let nutrition_json = match nutrition {
        Some(n) => to_json(n, "nutrition data")?,
        None => NUTRITION_PLACEHOLDER.to_string(),
    };

    let chemicals_json = to_json(
        &serde_json::json!({
            "detected_chemicals": chemicals
                .detected_chemicals
                .iter()
                .map(|c| serde_json::json!({
                    "name": c.name,
                    "category": c.category,
                    "risk_level": c.risk_level,
                    "description": c.description,
                }))
                .collect::<Vec<_>>(),
            "overall_risk": chemicals.overall_risk_level,
            "safety_score": chemicals.safety_score,
        }),
        "chemical analysis",
    )?;

    let profile_json = match profile.filter(|p| !p.is_empty()) {
        Some(p) => to_json(p, "user profile")?,
        None => PROFILE_PLACEHOLDER.to_string(),
    };

    Ok(fill_template(
        ANALYSIS_PROMPT_TEMPLATE,
        &[
            ("evidence_instruction", EVIDENCE_INSTRUCTION.trim()),
            ("medical_scope", MEDICAL_SCOPE_INSTRUCTION.trim()),
            ("nutrition_json", &nutrition_json),
            ("chemicals_json", &chemicals_json),
            ("profile_json", &profile_json),
            ("label_text", truncate_chars(text, MAX_PROMPT_TEXT_CHARS)),
        ],
    ))
}

pub fn build_quick_prompt(text: &str) -> String {
    fill_template(
        QUICK_PROMPT_TEMPLATE,
        &[("label_text", truncate_chars(text, MAX_PROMPT_TEXT_CHARS))],
    )
}

/// System prompt for structured label analysis.
pub fn analysis_system() -> String {
    format!("{ANALYSIS_PERSONA} {JSON_ONLY_SYSTEM}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::chemicals::analyze_chemicals;

    const LABEL: &str = "Nutrition Facts\nServing Size 1 bar (40g)\nCalories 190\nSodium 210mg\n\
        Ingredients: oats, peanuts, high fructose corn syrup, red 40";

    #[test]
    fn test_prompt_contains_label_data_and_profile() {
        let nutrition = NutritionData {
            calories: Some(190.0),
            sodium: Some(210.0),
            ..Default::default()
        };
        let chemicals = analyze_chemicals(LABEL);
        let profile = UserProfile {
            allergies: vec!["peanuts".into()],
            health_conditions: vec!["diabetes".into()],
            ..Default::default()
        };

        let prompt =
            build_analysis_prompt(LABEL, Some(&nutrition), &chemicals, Some(&profile)).unwrap();

        assert!(prompt.contains("Serving Size 1 bar (40g)"));
        assert!(prompt.contains("\"calories\": 190.0"));
        assert!(prompt.contains("High Fructose Corn Syrup"));
        assert!(prompt.contains("\"overall_risk\": \"high\""));
        assert!(prompt.contains("\"peanuts\""));
        assert!(prompt.contains("\"diabetes\""));
        assert!(prompt.contains("\"portion_size\""));
        assert!(prompt.contains("not medical advice"));
        assert!(!prompt.contains("{label_text}"));
        assert!(!prompt.contains(NUTRITION_PLACEHOLDER));
        assert!(!prompt.contains(PROFILE_PLACEHOLDER));
    }

    #[test]
    fn test_prompt_placeholders_for_missing_data() {
        let chemicals = analyze_chemicals("water");
        let prompt = build_analysis_prompt("water", None, &chemicals, None).unwrap();
        assert!(prompt.contains(NUTRITION_PLACEHOLDER));
        assert!(prompt.contains(PROFILE_PLACEHOLDER));
        assert!(prompt.contains("\"detected_chemicals\": []"));
    }

    #[test]
    fn test_empty_profile_counts_as_not_provided() {
        let chemicals = analyze_chemicals("water");
        let prompt =
            build_analysis_prompt("water", None, &chemicals, Some(&UserProfile::default())).unwrap();
        assert!(prompt.contains(PROFILE_PLACEHOLDER));
    }

    #[test]
    fn test_label_text_is_truncated() {
        let long = format!("{}TAIL_MARKER", "é".repeat(MAX_PROMPT_TEXT_CHARS));
        let chemicals = analyze_chemicals("");
        let prompt = build_analysis_prompt(&long, None, &chemicals, None).unwrap();
        assert!(!prompt.contains("TAIL_MARKER"));
        assert!(prompt.contains(&"é".repeat(MAX_PROMPT_TEXT_CHARS)));
    }

    #[test]
    fn test_braces_in_label_text_are_not_substituted() {
        let chemicals = analyze_chemicals("");
        let prompt =
            build_analysis_prompt("odd OCR {profile_json} text", None, &chemicals, None).unwrap();
        assert!(prompt.contains("odd OCR {profile_json} text"));
    }

    #[test]
    fn test_placeholder_in_profile_is_not_expanded() {
        let chemicals = analyze_chemicals(LABEL);
        let profile = UserProfile {
            allergies: vec!["{label_text}".into()],
            ..Default::default()
        };
        let prompt = build_analysis_prompt(LABEL, None, &chemicals, Some(&profile)).unwrap();

        assert_eq!(prompt.matches("Serving Size 1 bar (40g)").count(), 1);
        assert!(prompt.contains("\"{label_text}\""));
    }

    #[test]
    fn test_fill_template_single_pass() {
        let filled = fill_template(
            "a={a} b={b} json={ \"k\": 1 } unknown={zzz}",
            &[("a", "{b}"), ("b", "2")],
        );
        assert_eq!(filled, "a={b} b=2 json={ \"k\": 1 } unknown={zzz}");
    }

    #[test]
    fn test_quick_prompt() {
        let prompt = build_quick_prompt("Calories 250\nSugar 30g");
        assert!(prompt.contains("Calories 250\nSugar 30g"));
        assert!(prompt.contains("Health score (1-10"));
        assert!(prompt.contains("consume/limit/avoid"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("ñandú", 2), "ña");
    }
}
