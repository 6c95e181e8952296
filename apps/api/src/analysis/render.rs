//! Display-ready view of an `AnalysisResult`, as JSON or Markdown.

use serde::Serialize;
use uuid::Uuid;

use crate::analysis::insights::{score_verdict, ScoreVerdict};
use crate::analysis::models::{AnalysisResult, NutritionData, RiskLevel};

#[derive(Debug, Clone, Serialize)]
pub struct ChemicalLine {
    pub name: String,
    pub category: String,
    pub risk_level: RiskLevel,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NutritionRow {
    pub label: &'static str,
    pub amount: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub analysis_id: Uuid,
    pub headline: String,
    /// "X.X/10"
    pub score_display: String,
    pub verdict: ScoreVerdict,
    pub verdict_label: &'static str,
    /// "N/100"
    pub novi_display: String,
    pub recommendation: &'static str,
    /// Allergen warnings first, then health conditions, then diet.
    pub warnings: Vec<String>,
    pub nutrition: Vec<NutritionRow>,
    pub chemicals: Vec<ChemicalLine>,
    pub benefits: Vec<String>,
    pub risks: Vec<String>,
    pub alternatives: Vec<String>,
    pub tips: Vec<String>,
    pub portion_size: Option<String>,
    pub frequency: Option<String>,
    /// The model's own rating, when it gave one.
    pub ai_score_display: Option<String>,
    pub insight_source: String,
    /// "NN%"
    pub confidence_display: String,
    /// Nutrition plausibility errors, then warnings.
    pub data_issues: Vec<String>,
}

pub fn render_report(result: &AnalysisResult) -> AnalysisReport {
    let rec = &result.health_recommendation;
    let verdict = score_verdict(rec.overall_score);

    let warnings = rec
        .allergen_warnings
        .iter()
        .chain(&rec.health_condition_warnings)
        .chain(&rec.dietary_warnings)
        .cloned()
        .collect();

    let chemicals = result
        .chemical_analysis
        .detected_chemicals
        .iter()
        .map(|c| ChemicalLine {
            name: c.name.clone(),
            category: c.category.clone(),
            risk_level: c.risk_level,
            description: c.description.clone(),
        })
        .collect();

    AnalysisReport {
        analysis_id: result.analysis_id,
        headline: format!("{} - {}", verdict.label(), rec.recommendation_type.label()),
        score_display: format!("{:.1}/10", rec.overall_score),
        verdict,
        verdict_label: verdict.label(),
        novi_display: format!("{:.0}/100", rec.novi_score),
        recommendation: rec.recommendation_type.label(),
        warnings,
        nutrition: result
            .nutrition_data
            .as_ref()
            .map(nutrition_rows)
            .unwrap_or_default(),
        chemicals,
        benefits: rec.insights.benefits.clone(),
        risks: rec.insights.risks.clone(),
        alternatives: rec.insights.alternatives.clone(),
        tips: rec.insights.tips.clone(),
        portion_size: rec.insights.portion_size.clone(),
        frequency: rec.insights.frequency.clone(),
        ai_score_display: rec.insights.health_score.map(|s| format!("{s:.1}/10")),
        insight_source: rec.insight_source.clone(),
        confidence_display: format!("{:.0}%", result.confidence_score * 100.0),
        data_issues: result
            .nutrition_validation
            .as_ref()
            .map(|v| v.errors.iter().chain(&v.warnings).cloned().collect())
            .unwrap_or_default(),
    }
}

fn nutrition_rows(n: &NutritionData) -> Vec<NutritionRow> {
    let fields: [(&'static str, Option<f64>, &str); 15] = [
        ("Calories", n.calories, ""),
        ("Total Fat", n.total_fat, "g"),
        ("Saturated Fat", n.saturated_fat, "g"),
        ("Trans Fat", n.trans_fat, "g"),
        ("Cholesterol", n.cholesterol, "mg"),
        ("Sodium", n.sodium, "mg"),
        ("Total Carbohydrates", n.total_carbohydrates, "g"),
        ("Dietary Fiber", n.dietary_fiber, "g"),
        ("Total Sugars", n.total_sugars, "g"),
        ("Added Sugars", n.added_sugars, "g"),
        ("Protein", n.protein, "g"),
        ("Vitamin D", n.vitamin_d, "µg"),
        ("Calcium", n.calcium, "mg"),
        ("Iron", n.iron, "mg"),
        ("Potassium", n.potassium, "mg"),
    ];

    let mut rows = Vec::new();
    if let Some(serving) = &n.serving_size {
        rows.push(NutritionRow {
            label: "Serving Size",
            amount: serving.clone(),
        });
    }
    rows.extend(fields.into_iter().filter_map(|(label, value, unit)| {
        value.map(|v| NutritionRow {
            label,
            amount: format!("{}{}", trim_number(v), unit),
        })
    }));
    rows
}

/// 12.0 -> "12", 0.5 -> "0.5"
fn trim_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        let s = format!("{value:.2}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn bullet_section(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    lines.push(format!("## {title}"));
    lines.extend(items.iter().map(|item| format!("- {item}")));
    lines.push(String::new());
}

impl AnalysisReport {
    pub fn to_markdown(&self) -> String {
        let mut lines = vec![
            "# Food Label Analysis".to_string(),
            String::new(),
            format!("**{}**", self.headline),
            String::new(),
            format!(
                "- **Health Score:** {} ({})",
                self.score_display, self.verdict_label
            ),
            format!("- **NOVI Score:** {}", self.novi_display),
            format!("- **Recommendation:** {}", self.recommendation),
        ];
        if let Some(ai_score) = &self.ai_score_display {
            lines.push(format!("- **AI Health Score:** {ai_score}"));
        }
        lines.push(String::new());

        bullet_section(&mut lines, "Warnings", &self.warnings);

        if !self.nutrition.is_empty() {
            lines.push("## Nutrition Facts".to_string());
            lines.push("| Nutrient | Amount |".to_string());
            lines.push("|---|---|".to_string());
            lines.extend(
                self.nutrition
                    .iter()
                    .map(|row| format!("| {} | {} |", row.label, row.amount)),
            );
            lines.push(String::new());
        }

        let chemicals: Vec<String> = self
            .chemicals
            .iter()
            .map(|c| format!("**{}** ({} risk): {}", c.name, c.risk_level.as_str(), c.description))
            .collect();
        bullet_section(&mut lines, "Detected Additives", &chemicals);

        bullet_section(&mut lines, "Benefits", &self.benefits);
        bullet_section(&mut lines, "Risks", &self.risks);
        bullet_section(&mut lines, "Healthier Alternatives", &self.alternatives);
        bullet_section(&mut lines, "Tips", &self.tips);
        bullet_section(&mut lines, "Data Quality", &self.data_issues);

        if let Some(portion) = &self.portion_size {
            lines.push(format!("**Portion size:** {portion}"));
        }
        if let Some(frequency) = &self.frequency {
            lines.push(format!("**Frequency:** {frequency}"));
        }
        lines.push(String::new());
        lines.push(format!(
            "_Analysis {} · confidence {} · insights: {}_",
            self.analysis_id, self.confidence_display, self.insight_source
        ));

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::chemicals::analyze_chemicals;
    use crate::analysis::insights::parse_ai_response;
    use crate::analysis::models::{HealthRecommendation, RecommendationType};
    use crate::analysis::nutrition::NutritionValidation;
    use chrono::Utc;

    fn result_with(overall_score: f64, ai_reply: &str) -> AnalysisResult {
        AnalysisResult {
            analysis_id: Uuid::new_v4(),
            session_id: None,
            timestamp: Utc::now(),
            extracted_text: "Ingredients: peanuts, red 40".into(),
            ocr_confidence: Some(88.0),
            nutrition_data: Some(NutritionData {
                serving_size: Some("1 bar (40g)".into()),
                calories: Some(190.0),
                total_fat: Some(7.5),
                sodium: Some(150.0),
                ..Default::default()
            }),
            nutrition_validation: None,
            chemical_analysis: analyze_chemicals("red 40"),
            health_recommendation: HealthRecommendation {
                overall_score,
                novi_score: 45.0,
                recommendation_type: RecommendationType::Limit,
                allergen_warnings: vec!["Contains peanuts - matches your allergy profile".into()],
                health_condition_warnings: vec!["High sugar content - monitor blood glucose".into()],
                dietary_warnings: vec![],
                insights: parse_ai_response(ai_reply),
                insight_source: "live".into(),
            },
            processing_time_ms: 12,
            model_version: "llama-test".into(),
            confidence_score: 0.7333,
        }
    }

    const MOCKED_REPLY: &str = r#"{"benefits": ["Good protein"], "risks": ["Artificial color"],
        "alternatives": ["Plain roasted peanuts"], "tips": ["Eat half a bar"],
        "portion_size": "Half a bar", "frequency": "Weekly", "health_score": 5.5}"#;

    #[test]
    fn test_report_surfaces_score_and_warnings() {
        let report = render_report(&result_with(6.0, MOCKED_REPLY));

        assert_eq!(report.score_display, "6.0/10");
        assert_eq!(report.verdict, ScoreVerdict::Moderate);
        assert_eq!(report.novi_display, "45/100");
        assert_eq!(report.recommendation, "Limit consumption");
        assert_eq!(report.headline, "Moderate - Limit consumption");
        assert_eq!(
            report.warnings,
            vec![
                "Contains peanuts - matches your allergy profile",
                "High sugar content - monitor blood glucose",
            ]
        );
        assert_eq!(report.chemicals[0].name, "Red 40");
        assert_eq!(report.benefits, vec!["Good protein"]);
        assert_eq!(report.ai_score_display.as_deref(), Some("5.5/10"));
        assert_eq!(report.confidence_display, "73%");
    }

    #[test]
    fn test_nutrition_rows_skip_missing_values() {
        let report = render_report(&result_with(6.0, MOCKED_REPLY));
        assert_eq!(
            report.nutrition,
            vec![
                NutritionRow { label: "Serving Size", amount: "1 bar (40g)".into() },
                NutritionRow { label: "Calories", amount: "190".into() },
                NutritionRow { label: "Total Fat", amount: "7.5g".into() },
                NutritionRow { label: "Sodium", amount: "150mg".into() },
            ]
        );
    }

    #[test]
    fn test_markdown_contains_sections() {
        let markdown = render_report(&result_with(8.2, MOCKED_REPLY)).to_markdown();
        assert!(markdown.starts_with("# Food Label Analysis"));
        assert!(markdown.contains("**Health Score:** 8.2/10 (Good Choice)"));
        assert!(markdown.contains("## Warnings\n- Contains peanuts - matches your allergy profile"));
        assert!(markdown.contains("| Sodium | 150mg |"));
        assert!(markdown.contains("**Red 40** (medium risk)"));
        assert!(markdown.contains("## Healthier Alternatives\n- Plain roasted peanuts"));
        assert!(markdown.contains("**Frequency:** Weekly"));
    }

    #[test]
    fn test_markdown_omits_empty_sections() {
        let mut result = result_with(2.0, "no json here");
        result.health_recommendation.allergen_warnings.clear();
        result.health_recommendation.health_condition_warnings.clear();
        let markdown = render_report(&result).to_markdown();
        assert!(!markdown.contains("## Warnings"));
        assert!(markdown.contains("(Poor Choice)"));
        assert!(!markdown.contains("AI Health Score"));
        assert!(!markdown.contains("## Data Quality"));
    }

    #[test]
    fn test_nutrition_validation_issues_are_listed() {
        let mut result = result_with(6.0, MOCKED_REPLY);
        result.nutrition_validation = Some(NutritionValidation {
            is_valid: false,
            warnings: vec!["Very high sodium content".into()],
            errors: vec!["Added sugars cannot exceed total sugars".into()],
        });
        let report = render_report(&result);
        assert_eq!(
            report.data_issues,
            vec![
                "Added sugars cannot exceed total sugars",
                "Very high sodium content"
            ]
        );
        assert!(report
            .to_markdown()
            .contains("## Data Quality\n- Added sugars cannot exceed total sugars"));
    }

    #[test]
    fn test_trim_number() {
        assert_eq!(trim_number(12.0), "12");
        assert_eq!(trim_number(0.5), "0.5");
        assert_eq!(trim_number(2.25), "2.25");
    }
}
