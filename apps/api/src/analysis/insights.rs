//! Turning model replies into `AiInsights`, plus the rule-based fallback.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analysis::models::{AiInsights, ChemicalAnalysis, NutritionData, RiskLevel};
use crate::llm_client::strip_json_fences;

const DEFAULT_PORTION: &str = "Follow serving size on label";

static SCORE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:score|rating).*?(\d+(?:\.\d+)?)").expect("score pattern must compile")
});

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Used when the reply carries no JSON object at all.
pub fn text_response_insights() -> AiInsights {
    AiInsights {
        benefits: strings(&["Provides essential nutrients"]),
        risks: strings(&["May contain additives"]),
        alternatives: strings(&["Look for organic alternatives"]),
        tips: strings(&["Consume in moderation"]),
        portion_size: Some(DEFAULT_PORTION.to_string()),
        frequency: Some("Occasionally".to_string()),
        health_score: None,
    }
}

/// Used when the reply contains an object that does not deserialize.
pub fn default_insights() -> AiInsights {
    AiInsights {
        benefits: strings(&["Check nutrition label for specific benefits"]),
        risks: strings(&["Consume as part of balanced diet"]),
        alternatives: strings(&["Consider whole food alternatives"]),
        tips: strings(&["Read ingredient list carefully"]),
        portion_size: Some(DEFAULT_PORTION.to_string()),
        frequency: Some("In moderation".to_string()),
        health_score: None,
    }
}

/// Parses a model reply, tolerating code fences and prose around the JSON object.
pub fn parse_ai_response(response: &str) -> AiInsights {
    let body = strip_json_fences(response);

    let object = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => return text_response_insights(),
    };

    match serde_json::from_str::<AiInsights>(object) {
        Ok(mut insights) => {
            insights.health_score = insights
                .health_score
                .filter(|s| s.is_finite() && (0.0..=10.0).contains(s));
            insights
        }
        Err(e) => {
            warn!("Failed to parse AI response: {}", e);
            default_insights()
        }
    }
}

/// Rule-based insights for when the advisor is unavailable.
pub fn fallback_insights(
    nutrition: Option<&NutritionData>,
    chemicals: &ChemicalAnalysis,
) -> AiInsights {
    let mut insights = AiInsights {
        portion_size: Some(DEFAULT_PORTION.to_string()),
        frequency: Some("Occasionally".to_string()),
        ..Default::default()
    };

    if chemicals.overall_risk_level >= RiskLevel::High {
        insights
            .risks
            .push("Contains high-risk chemical additives".to_string());
        insights.frequency = Some("Rarely or avoid".to_string());
    }

    if nutrition.and_then(|n| n.sodium).is_some_and(|s| s > 600.0) {
        insights.risks.push("High sodium content".to_string());
        insights.tips.push("Drink plenty of water".to_string());
    }

    insights
}

/// First number following "score" or "rating" in a free-text reply, if it is at most 10.
pub fn extract_health_score(text: &str) -> Option<f64> {
    let lower = text.to_lowercase();
    let caps = SCORE_RE.captures(&lower)?;
    let score: f64 = caps.get(1)?.as_str().parse().ok()?;
    (score <= 10.0).then_some(score)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreVerdict {
    Good,
    Moderate,
    Poor,
}

impl ScoreVerdict {
    pub fn label(&self) -> &'static str {
        match self {
            ScoreVerdict::Good => "Good Choice",
            ScoreVerdict::Moderate => "Moderate",
            ScoreVerdict::Poor => "Poor Choice",
        }
    }
}

pub fn score_verdict(score: f64) -> ScoreVerdict {
    if score >= 7.0 {
        ScoreVerdict::Good
    } else if score >= 4.0 {
        ScoreVerdict::Moderate
    } else {
        ScoreVerdict::Poor
    }
}
