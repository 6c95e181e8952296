//! Insight advisors: pluggable backends that turn an analysis prompt into `AiInsights`.
//!
//! `LlmAdvisor` calls the chat-completions API through `LlmClient`.
//! `MockAdvisor` derives canned insights from the parsed label with no network call,
//! used when no API key is configured and in tests.
//!
//! `AppState` holds an `Arc<dyn InsightAdvisor>`, chosen at startup via config.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::analysis::chemicals::analyze_chemicals;
use crate::analysis::insights::{fallback_insights, parse_ai_response};
use crate::analysis::models::{AiInsights, ChemicalAnalysis, NutritionData, RiskLevel, UserProfile};
use crate::analysis::nutrition::parse_nutrition;
use crate::analysis::prompts::{analysis_system, QUICK_SYSTEM};
use crate::analysis::scoring::{nutrition_score, recommendation_type};
use crate::errors::AppError;
use crate::llm_client::LlmClient;

/// Parsed label facts handed to the advisor alongside the prompt.
#[derive(Debug, Clone, Copy)]
pub struct AdviceContext<'a> {
    pub nutrition: Option<&'a NutritionData>,
    pub chemicals: &'a ChemicalAnalysis,
    pub profile: Option<&'a UserProfile>,
}

/// The advisor trait. Implement this to swap backends without touching
/// the pipeline or handlers.
#[async_trait]
pub trait InsightAdvisor: Send + Sync {
    /// "live" | "mock", reported in results for transparency.
    fn backend(&self) -> &'static str;

    fn model_version(&self) -> String;

    /// Structured insights for the analysis prompt.
    async fn advise(&self, prompt: &str, ctx: &AdviceContext<'_>) -> Result<AiInsights, AppError>;

    /// Free-text assessment for the quick prompt. `label_text` is the raw text the prompt embeds.
    async fn assess(&self, prompt: &str, label_text: &str) -> Result<String, AppError>;
}

/// Asks the advisor, falling back to rule-based insights on any error.
/// Returns the insights and their source ("live", "mock" or "fallback").
pub async fn advise_with_fallback(
    advisor: &dyn InsightAdvisor,
    prompt: &str,
    ctx: &AdviceContext<'_>,
) -> (AiInsights, String) {
    match advisor.advise(prompt, ctx).await {
        Ok(insights) => (insights, advisor.backend().to_string()),
        Err(e) => {
            warn!("Insight advisor failed, using fallback insights: {}", e);
            (
                fallback_insights(ctx.nutrition, ctx.chemicals),
                "fallback".to_string(),
            )
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LlmAdvisor
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmAdvisor(pub LlmClient);

#[async_trait]
impl InsightAdvisor for LlmAdvisor {
    fn backend(&self) -> &'static str {
        "live"
    }

    fn model_version(&self) -> String {
        self.0.model().to_string()
    }

    async fn advise(&self, prompt: &str, _ctx: &AdviceContext<'_>) -> Result<AiInsights, AppError> {
        let reply = self
            .0
            .call_text(prompt, &analysis_system())
            .await
            .map_err(|e| AppError::Llm(format!("Insight generation failed: {e}")))?;
        debug!("Insight reply: {} chars", reply.len());
        Ok(parse_ai_response(&reply))
    }

    async fn assess(&self, prompt: &str, _label_text: &str) -> Result<String, AppError> {
        self.0
            .call_text(prompt, QUICK_SYSTEM)
            .await
            .map_err(|e| AppError::Llm(format!("Quick assessment failed: {e}")))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MockAdvisor
// ────────────────────────────────────────────────────────────────────────────

pub const MOCK_MODEL_VERSION: &str = "mock-advisor-v1";

/// Deterministic advisor. Same context in, same insights out.
pub struct MockAdvisor;

#[async_trait]
impl InsightAdvisor for MockAdvisor {
    fn backend(&self) -> &'static str {
        "mock"
    }

    fn model_version(&self) -> String {
        MOCK_MODEL_VERSION.to_string()
    }

    async fn advise(&self, _prompt: &str, ctx: &AdviceContext<'_>) -> Result<AiInsights, AppError> {
        Ok(mock_insights(ctx))
    }

    async fn assess(&self, _prompt: &str, label_text: &str) -> Result<String, AppError> {
        Ok(mock_assessment(label_text))
    }
}

fn above(value: Option<f64>, limit: f64) -> bool {
    value.is_some_and(|v| v > limit)
}

fn mock_insights(ctx: &AdviceContext<'_>) -> AiInsights {
    let n = ctx.nutrition.cloned().unwrap_or_default();

    let mut benefits = Vec::new();
    if above(n.protein, 10.0) {
        benefits.push("Good source of protein".to_string());
    }
    if above(n.dietary_fiber, 3.0) {
        benefits.push("Good source of dietary fiber".to_string());
    }
    if benefits.is_empty() {
        benefits.push("Provides energy".to_string());
    }

    let mut risks: Vec<String> = ctx
        .chemicals
        .detected_chemicals
        .iter()
        .filter(|c| c.risk_level >= RiskLevel::Medium)
        .map(|c| format!("Contains {}: {}", c.name, c.description))
        .collect();
    if above(n.sodium, 600.0) {
        risks.push("High sodium content".to_string());
    }
    if above(n.total_sugars, 15.0) {
        risks.push("High sugar content".to_string());
    }
    if above(n.trans_fat, 0.0) {
        risks.push("Contains trans fat".to_string());
    }

    let alternatives: BTreeSet<String> = ctx
        .chemicals
        .detected_chemicals
        .iter()
        .flat_map(|c| c.alternatives.iter().cloned())
        .collect();
    let mut alternatives: Vec<String> = alternatives.into_iter().take(3).collect();
    if alternatives.is_empty() {
        alternatives.push("Choose minimally processed options".to_string());
    }

    let mut tips = vec!["Check the serving size before eating".to_string()];
    if above(n.total_sugars, 15.0) {
        tips.push("Pair with protein or fiber to slow sugar absorption".to_string());
    }

    let mut frequency = match ctx.chemicals.overall_risk_level {
        RiskLevel::High | RiskLevel::Critical => "Rarely or avoid",
        RiskLevel::Medium => "Occasionally",
        RiskLevel::Low => "Daily in moderation",
    };

    if let Some(profile) = ctx.profile {
        for condition in &profile.health_conditions {
            match condition.to_lowercase().as_str() {
                "diabetes" => {
                    tips.push("Count this toward your daily carbohydrate budget".to_string());
                    if above(n.total_sugars, 15.0) {
                        risks.push("Sugar level may spike blood glucose".to_string());
                        frequency = "Rarely or avoid";
                    }
                }
                "hypertension" | "high blood pressure" => {
                    tips.push("Balance sodium across the rest of the day".to_string());
                    if above(n.sodium, 400.0) {
                        risks.push("Sodium level may raise blood pressure".to_string());
                    }
                }
                "heart disease" => {
                    tips.push("Favor unsaturated fats in your other meals".to_string());
                    if above(n.saturated_fat, 3.0) || above(n.trans_fat, 0.0) {
                        risks.push("Fat profile is a concern for heart health".to_string());
                    }
                }
                _ => tips.push(format!(
                    "Ask your doctor how this fits a diet for {condition}"
                )),
            }
        }
        if !profile.allergies.is_empty() {
            tips.push(format!(
                "Re-check the ingredient list for: {}",
                profile.allergies.join(", ")
            ));
        }
        for restriction in &profile.dietary_restrictions {
            tips.push(format!("Confirm the product is certified {restriction}"));
        }
    }

    AiInsights {
        benefits,
        risks,
        alternatives,
        tips,
        portion_size: Some(
            n.serving_size
                .map(|s| format!("One serving ({s})"))
                .unwrap_or_else(|| "Follow serving size on label".to_string()),
        ),
        frequency: Some(frequency.to_string()),
        health_score: None,
    }
}

fn mock_assessment(label_text: &str) -> String {
    let nutrition = parse_nutrition(label_text);
    let chemicals = analyze_chemicals(label_text);
    let score = nutrition_score(nutrition.as_ref());
    let recommendation = recommendation_type(score, chemicals.overall_risk_level);

    let concerns: Vec<&str> = chemicals
        .detected_chemicals
        .iter()
        .map(|c| c.name.as_str())
        .collect();

    format!(
        "1. Health score: {score:.1}/10\n\
         2. Main health concerns: {}\n\
         3. Detected additives: {}\n\
         4. Recommendation: {}\n\
         5. Based on the parsed nutrition values and ingredient list.",
        chemicals.recommendations.join("; "),
        if concerns.is_empty() {
            "none".to_string()
        } else {
            concerns.join(", ")
        },
        recommendation.label(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::insights::extract_health_score;
    use crate::analysis::prompts::build_quick_prompt;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    struct FailingAdvisor;

    #[async_trait]
    impl InsightAdvisor for FailingAdvisor {
        fn backend(&self) -> &'static str {
            "live"
        }

        fn model_version(&self) -> String {
            "failing".to_string()
        }

        async fn advise(&self, _: &str, _: &AdviceContext<'_>) -> Result<AiInsights, AppError> {
            Err(AppError::Llm("upstream down".into()))
        }

        async fn assess(&self, _: &str, _: &str) -> Result<String, AppError> {
            Err(AppError::Llm("upstream down".into()))
        }
    }

    #[tokio::test]
    async fn test_mock_advisor_is_deterministic() {
        let chemicals = analyze_chemicals("high fructose corn syrup, red 40");
        let nutrition = NutritionData {
            sodium: Some(700.0),
            protein: Some(12.0),
            serving_size: Some("1 cup (30g)".into()),
            ..Default::default()
        };
        let ctx = AdviceContext {
            nutrition: Some(&nutrition),
            chemicals: &chemicals,
            profile: None,
        };

        let first = MockAdvisor.advise("prompt", &ctx).await.unwrap();
        let second = MockAdvisor.advise("other prompt", &ctx).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.benefits, vec!["Good source of protein"]);
        assert!(first.risks.iter().any(|r| r.starts_with("Contains High Fructose Corn Syrup")));
        assert!(first.risks.contains(&"High sodium content".to_string()));
        assert_eq!(first.frequency.as_deref(), Some("Rarely or avoid"));
        assert_eq!(first.portion_size.as_deref(), Some("One serving (1 cup (30g))"));
        assert!(first.alternatives.len() <= 3);
    }

    #[tokio::test]
    async fn test_mock_advisor_tailors_to_profile() {
        let chemicals = analyze_chemicals("salt, sugar");
        let nutrition = NutritionData {
            sodium: Some(500.0),
            total_sugars: Some(20.0),
            ..Default::default()
        };
        let diabetic = UserProfile {
            health_conditions: vec!["Diabetes".into()],
            allergies: vec!["Peanuts".into()],
            ..Default::default()
        };
        let hypertensive = UserProfile {
            health_conditions: vec!["hypertension".into()],
            dietary_restrictions: vec!["vegan".into()],
            ..Default::default()
        };
        let generic_ctx = AdviceContext {
            nutrition: Some(&nutrition),
            chemicals: &chemicals,
            profile: None,
        };
        let diabetic_ctx = AdviceContext {
            profile: Some(&diabetic),
            ..generic_ctx
        };
        let hypertensive_ctx = AdviceContext {
            profile: Some(&hypertensive),
            ..generic_ctx
        };

        let for_diabetic = MockAdvisor.advise("p", &diabetic_ctx).await.unwrap();
        let for_hypertensive = MockAdvisor.advise("p", &hypertensive_ctx).await.unwrap();
        let generic = MockAdvisor.advise("p", &generic_ctx).await.unwrap();

        assert_ne!(for_diabetic, for_hypertensive);
        assert_ne!(for_diabetic, generic);
        assert!(for_diabetic
            .risks
            .contains(&"Sugar level may spike blood glucose".to_string()));
        assert!(for_diabetic
            .tips
            .contains(&"Re-check the ingredient list for: Peanuts".to_string()));
        assert_eq!(for_diabetic.frequency.as_deref(), Some("Rarely or avoid"));
        assert!(for_hypertensive
            .risks
            .contains(&"Sodium level may raise blood pressure".to_string()));
        assert!(for_hypertensive
            .tips
            .contains(&"Confirm the product is certified vegan".to_string()));
        assert_eq!(for_hypertensive.frequency.as_deref(), Some("Daily in moderation"));
    }

    #[tokio::test]
    async fn test_mock_assessment_has_extractable_score() {
        let text = "Calories 250\nTotal Sugars 30g\nIngredients: sugar, aspartame";
        let reply = MockAdvisor
            .assess(&build_quick_prompt(text), text)
            .await
            .unwrap();
        // 7 - 1 for sugar
        assert_eq!(extract_health_score(&reply), Some(6.0));
        assert!(reply.contains("Aspartame"));
    }

    #[tokio::test]
    async fn test_fallback_used_when_advisor_fails() {
        let chemicals = analyze_chemicals("bha");
        let ctx = AdviceContext {
            nutrition: None,
            chemicals: &chemicals,
            profile: None,
        };
        let (insights, source) = advise_with_fallback(&FailingAdvisor, "prompt", &ctx).await;
        assert_eq!(source, "fallback");
        assert_eq!(insights.frequency.as_deref(), Some("Rarely or avoid"));
    }

    #[tokio::test]
    async fn test_llm_advisor_parses_reply() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat");
                then.status(200).json_body(json!({
                    "choices": [{"message": {"content":
                        "```json\n{\"benefits\": [\"Whole grains\"], \"frequency\": \"Daily\"}\n```"}}]
                }));
            })
            .await;

        let client = LlmClient::new("k".into(), server.url("/chat"), "llama-test".into()).unwrap();
        let advisor = LlmAdvisor(client);
        let chemicals = analyze_chemicals("");
        let ctx = AdviceContext {
            nutrition: None,
            chemicals: &chemicals,
            profile: None,
        };

        let (insights, source) = advise_with_fallback(&advisor, "prompt", &ctx).await;
        assert_eq!(source, "live");
        assert_eq!(insights.benefits, vec!["Whole grains"]);
        assert_eq!(advisor.model_version(), "llama-test");
    }

    #[tokio::test]
    async fn test_llm_advisor_error_falls_back() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat");
                then.status(500);
            })
            .await;

        let client = LlmClient::new("k".into(), server.url("/chat"), "llama-test".into())
            .unwrap()
            .with_retry_base_delay(Duration::from_millis(1));
        let chemicals = analyze_chemicals("");
        let ctx = AdviceContext {
            nutrition: None,
            chemicals: &chemicals,
            profile: None,
        };

        let (_, source) = advise_with_fallback(&LlmAdvisor(client), "prompt", &ctx).await;
        assert_eq!(source, "fallback");
    }
}
