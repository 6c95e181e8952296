use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::nutrition::NutritionValidation;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    Child,
    Teen,
    Adult,
    Senior,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
    VeryActive,
}

/// Additive risk. Ordered so that `max()` yields the most severe level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// User-declared health profile, held in session state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
    #[serde(default)]
    pub health_conditions: Vec<String>,
    #[serde(default)]
    pub age_group: Option<AgeGroup>,
    #[serde(default)]
    pub activity_level: Option<ActivityLevel>,
    #[serde(default = "default_language")]
    pub preferred_language: String,
}

fn default_language() -> String {
    "en".to_string()
}

impl UserProfile {
    /// Trims list entries and drops blanks. Casing is kept for display;
    /// matching lower-cases its own copy.
    pub fn normalized(mut self) -> Self {
        self.allergies = clean_list(self.allergies);
        self.dietary_restrictions = clean_list(self.dietary_restrictions);
        self.health_conditions = clean_list(self.health_conditions);
        if self.preferred_language.trim().is_empty() {
            self.preferred_language = default_language();
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.allergies.is_empty()
            && self.dietary_restrictions.is_empty()
            && self.health_conditions.is_empty()
            && self.age_group.is_none()
            && self.activity_level.is_none()
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Nutrition facts. Masses in grams except cholesterol, sodium, calcium,
/// iron and potassium (mg) and vitamin D (µg).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NutritionData {
    pub serving_size: Option<String>,
    pub calories: Option<f64>,
    pub total_fat: Option<f64>,
    pub saturated_fat: Option<f64>,
    pub trans_fat: Option<f64>,
    pub cholesterol: Option<f64>,
    pub sodium: Option<f64>,
    pub total_carbohydrates: Option<f64>,
    pub dietary_fiber: Option<f64>,
    pub total_sugars: Option<f64>,
    pub added_sugars: Option<f64>,
    pub protein: Option<f64>,
    pub vitamin_d: Option<f64>,
    pub calcium: Option<f64>,
    pub iron: Option<f64>,
    pub potassium: Option<f64>,
}

impl NutritionData {
    /// Number of populated fields, serving size included.
    pub fn populated_fields(&self) -> usize {
        let numeric = [
            self.calories,
            self.total_fat,
            self.saturated_fat,
            self.trans_fat,
            self.cholesterol,
            self.sodium,
            self.total_carbohydrates,
            self.dietary_fiber,
            self.total_sugars,
            self.added_sugars,
            self.protein,
            self.vitamin_d,
            self.calcium,
            self.iron,
            self.potassium,
        ];
        numeric.iter().filter(|v| v.is_some()).count() + usize::from(self.serving_size.is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChemicalInfo {
    /// Display name, e.g. "High Fructose Corn Syrup".
    pub name: String,
    pub category: String,
    pub risk_level: RiskLevel,
    pub description: String,
    pub health_effects: Vec<String>,
    pub alternatives: Vec<String>,
    /// 0.0 to 1.0, from the strongest detection pass that found it.
    pub confidence: f32,
    /// Text surrounding the match.
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChemicalAnalysis {
    pub detected_chemicals: Vec<ChemicalInfo>,
    pub risk_summary: BTreeMap<RiskLevel, u32>,
    pub overall_risk_level: RiskLevel,
    /// 0 to 10, higher is safer.
    pub safety_score: f64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    Consume,
    Limit,
    Avoid,
}

impl RecommendationType {
    pub fn label(&self) -> &'static str {
        match self {
            RecommendationType::Consume => "Safe to consume",
            RecommendationType::Limit => "Limit consumption",
            RecommendationType::Avoid => "Avoid",
        }
    }
}

/// Free-form guidance produced by the insight advisor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AiInsights {
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub portion_size: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    /// Model's own 0 to 10 rating, when it offers one.
    #[serde(default)]
    pub health_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthRecommendation {
    /// 0 to 10, higher is better.
    pub overall_score: f64,
    /// 0 to 100 nutrition quality index.
    pub novi_score: f64,
    pub recommendation_type: RecommendationType,
    pub allergen_warnings: Vec<String>,
    pub health_condition_warnings: Vec<String>,
    pub dietary_warnings: Vec<String>,
    pub insights: AiInsights,
    /// "live", "mock" or "fallback".
    pub insight_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis_id: Uuid,
    pub session_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub extracted_text: String,
    pub ocr_confidence: Option<f32>,
    pub nutrition_data: Option<NutritionData>,
    /// Plausibility check of `nutrition_data`; `None` when nothing was parsed.
    pub nutrition_validation: Option<NutritionValidation>,
    pub chemical_analysis: ChemicalAnalysis,
    pub health_recommendation: HealthRecommendation,
    pub processing_time_ms: u64,
    pub model_version: String,
    /// 0 to 1
    pub confidence_score: f64,
}

/// One line of a session's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisSummary {
    pub analysis_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub overall_score: f64,
    pub recommendation_type: RecommendationType,
    pub overall_risk_level: RiskLevel,
    pub chemicals_detected: usize,
    pub warnings: usize,
}

impl From<&AnalysisResult> for AnalysisSummary {
    fn from(result: &AnalysisResult) -> Self {
        let rec = &result.health_recommendation;
        Self {
            analysis_id: result.analysis_id,
            timestamp: result.timestamp,
            overall_score: rec.overall_score,
            recommendation_type: rec.recommendation_type,
            overall_risk_level: result.chemical_analysis.overall_risk_level,
            chemicals_detected: result.chemical_analysis.detected_chemicals.len(),
            warnings: rec.allergen_warnings.len()
                + rec.health_condition_warnings.len()
                + rec.dietary_warnings.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Accuracy,
    Usefulness,
    BugReport,
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub feedback_id: Uuid,
    pub analysis_id: Uuid,
    pub feedback_type: FeedbackType,
    /// 1 to 5
    pub rating: Option<u8>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_normalization_cleans_lists() {
        let profile = UserProfile {
            allergies: vec!["  Peanuts ".into(), "".into(), "MILK".into()],
            health_conditions: vec!["   ".into(), "Diabetes".into()],
            preferred_language: "".into(),
            ..Default::default()
        }
        .normalized();

        assert_eq!(profile.allergies, vec!["Peanuts", "MILK"]);
        assert_eq!(profile.health_conditions, vec!["Diabetes"]);
        assert_eq!(profile.preferred_language, "en");
    }

    #[test]
    fn test_profile_deserializes_with_defaults() {
        let profile: UserProfile =
            serde_json::from_str(r#"{"allergies": ["soy"], "age_group": "senior"}"#).unwrap();
        assert_eq!(profile.allergies, vec!["soy"]);
        assert_eq!(profile.age_group, Some(AgeGroup::Senior));
        assert_eq!(profile.preferred_language, "en");
        assert!(profile.dietary_restrictions.is_empty());
    }

    #[test]
    fn test_activity_level_snake_case() {
        let level: ActivityLevel = serde_json::from_str(r#""very_active""#).unwrap();
        assert_eq!(level, ActivityLevel::VeryActive);
    }

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Critical > RiskLevel::High);
        assert!(RiskLevel::Medium > RiskLevel::Low);
        assert_eq!(
            [RiskLevel::Medium, RiskLevel::High, RiskLevel::Low].iter().max(),
            Some(&RiskLevel::High)
        );
    }

    #[test]
    fn test_populated_fields_counts_serving_size() {
        let data = NutritionData {
            serving_size: Some("1 bar (40g)".into()),
            calories: Some(180.0),
            protein: Some(7.0),
            ..Default::default()
        };
        assert_eq!(data.populated_fields(), 3);
    }

    #[test]
    fn test_ai_insights_tolerates_missing_fields() {
        let insights: AiInsights = serde_json::from_str(r#"{"risks": ["High sodium"]}"#).unwrap();
        assert_eq!(insights.risks, vec!["High sodium"]);
        assert!(insights.benefits.is_empty());
        assert!(insights.health_score.is_none());
    }
}
