use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::advisor::{advise_with_fallback, AdviceContext, InsightAdvisor};
use crate::analysis::allergens::{
    check_allergens, check_dietary_restrictions, check_health_conditions,
};
use crate::analysis::chemicals::analyze_chemicals;
use crate::analysis::models::{AnalysisResult, HealthRecommendation, UserProfile};
use crate::analysis::nutrition::{parse_nutrition, validate_nutrition_data};
use crate::analysis::prompts::build_analysis_prompt;
use crate::analysis::scoring::{
    novi_score, nutrition_score, overall_confidence, recommendation_type,
};
use crate::errors::AppError;

/// Inputs for one label analysis.
pub struct LabelInput<'a> {
    pub text: &'a str,
    pub profile: Option<&'a UserProfile>,
    pub session_id: Option<Uuid>,
    /// Mean OCR word confidence, when the text came from an image.
    pub ocr_confidence: Option<f32>,
}

/// Runs the full pipeline over extracted label text:
/// nutrition -> additives -> scores -> insights -> profile warnings -> verdict.
pub async fn analyze_label(
    input: LabelInput<'_>,
    advisor: &dyn InsightAdvisor,
) -> Result<AnalysisResult, AppError> {
    let started = Instant::now();
    let text = input.text.trim();
    if text.is_empty() {
        return Err(AppError::Validation("Extracted text must not be empty".into()));
    }

    let analysis_id = Uuid::new_v4();
    info!(%analysis_id, "Analyzing label ({} chars)", text.chars().count());

    let nutrition = parse_nutrition(text);
    let nutrition_validation = nutrition.as_ref().map(validate_nutrition_data);
    if let Some(validation) = nutrition_validation.as_ref().filter(|v| !v.is_valid) {
        warn!(%analysis_id, errors = ?validation.errors, "Parsed nutrition values are inconsistent");
    }
    let chemicals = analyze_chemicals(text);

    let score = nutrition_score(nutrition.as_ref());
    let novi = novi_score(nutrition.as_ref(), &chemicals);

    let prompt = build_analysis_prompt(text, nutrition.as_ref(), &chemicals, input.profile)?;
    let ctx = AdviceContext {
        nutrition: nutrition.as_ref(),
        chemicals: &chemicals,
        profile: input.profile,
    };
    let (insights, insight_source) = advise_with_fallback(advisor, &prompt, &ctx).await;

    let health_recommendation = HealthRecommendation {
        overall_score: score,
        novi_score: novi,
        recommendation_type: recommendation_type(score, chemicals.overall_risk_level),
        allergen_warnings: check_allergens(text, input.profile),
        health_condition_warnings: check_health_conditions(nutrition.as_ref(), input.profile),
        dietary_warnings: check_dietary_restrictions(text, input.profile),
        insights,
        insight_source,
    };

    let confidence_score = overall_confidence(text, nutrition.as_ref(), &chemicals);
    let processing_time_ms = started.elapsed().as_millis() as u64;

    info!(
        %analysis_id,
        score,
        risk = chemicals.overall_risk_level.as_str(),
        chemicals = chemicals.detected_chemicals.len(),
        insight_source = %health_recommendation.insight_source,
        "Analysis complete in {}ms",
        processing_time_ms
    );

    Ok(AnalysisResult {
        analysis_id,
        session_id: input.session_id,
        timestamp: Utc::now(),
        extracted_text: text.to_string(),
        ocr_confidence: input.ocr_confidence,
        nutrition_data: nutrition,
        nutrition_validation,
        chemical_analysis: chemicals,
        health_recommendation,
        processing_time_ms,
        model_version: advisor.model_version(),
        confidence_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::advisor::MockAdvisor;
    use crate::analysis::models::{RecommendationType, RiskLevel};

    const CEREAL: &str = "Nutrition Facts\nServing Size 1 cup (30g)\nCalories 120\nTotal Fat 1g\n\
        Sodium 210mg\nTotal Carbohydrate 26g\nTotal Sugars 18g\nProtein 2g\n\
        Ingredients: corn, sugar, high fructose corn syrup, salt, red 40, wheat starch";

    fn input<'a>(text: &'a str, profile: Option<&'a UserProfile>) -> LabelInput<'a> {
        LabelInput {
            text,
            profile,
            session_id: None,
            ocr_confidence: None,
        }
    }

    #[tokio::test]
    async fn test_pipeline_end_to_end_with_mock_advisor() {
        let profile = UserProfile {
            allergies: vec!["wheat".into(), "soy".into()],
            health_conditions: vec!["diabetes".into()],
            dietary_restrictions: vec!["gluten-free".into()],
            ..Default::default()
        };

        let result = analyze_label(input(CEREAL, Some(&profile)), &MockAdvisor)
            .await
            .unwrap();

        let nutrition = result.nutrition_data.as_ref().unwrap();
        assert_eq!(nutrition.total_sugars, Some(18.0));
        assert_eq!(result.chemical_analysis.overall_risk_level, RiskLevel::High);

        let rec = &result.health_recommendation;
        // 7 - 1 for sugar
        assert_eq!(rec.overall_score, 6.0);
        assert_eq!(rec.recommendation_type, RecommendationType::Limit);
        assert_eq!(
            rec.allergen_warnings,
            vec!["Contains wheat - matches your allergy profile"]
        );
        assert_eq!(
            rec.health_condition_warnings,
            vec!["High sugar content - monitor blood glucose"]
        );
        assert_eq!(rec.dietary_warnings.len(), 1);
        assert_eq!(rec.insight_source, "mock");
        assert_eq!(result.model_version, "mock-advisor-v1");
        assert!(result.confidence_score > 0.0 && result.confidence_score <= 1.0);
    }

    #[tokio::test]
    async fn test_pipeline_without_nutrition_values() {
        let result = analyze_label(input("Ingredients: water, lemon juice", None), &MockAdvisor)
            .await
            .unwrap();
        assert!(result.nutrition_data.is_none());
        assert_eq!(result.health_recommendation.overall_score, 5.0);
        assert_eq!(
            result.health_recommendation.recommendation_type,
            RecommendationType::Consume
        );
        assert!(result.health_recommendation.allergen_warnings.is_empty());
    }

    #[tokio::test]
    async fn test_inconsistent_nutrition_is_flagged() {
        let label = "Nutrition Facts\nCalories 2400\nTotal Fat 5g\nSaturated Fat 9g\nProtein 3g";
        let result = analyze_label(input(label, None), &MockAdvisor).await.unwrap();

        let validation = result.nutrition_validation.unwrap();
        assert!(!validation.is_valid);
        assert_eq!(validation.errors, vec!["Saturated fat cannot exceed total fat"]);
        assert_eq!(validation.warnings, vec!["Very high calorie content"]);
    }

    #[tokio::test]
    async fn test_blank_text_rejected() {
        let err = analyze_label(input("   \n ", None), &MockAdvisor)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
