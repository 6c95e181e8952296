// Shared prompt constants.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Common instruction appended to every label analysis prompt.
pub const EVIDENCE_INSTRUCTION: &str = "\
    Base every statement on the label text and the detected additives provided. \
    Do NOT invent ingredients or nutrient values that are not present. \
    If a value is missing, say so instead of estimating it.";

/// Disclaimer fragment the model must respect when giving health guidance.
pub const MEDICAL_SCOPE_INSTRUCTION: &str = "\
    You give general nutrition guidance, not medical advice. \
    When the user profile lists a health condition, point out label values that matter for it \
    and suggest consulting a healthcare provider for individual limits.";
