use anyhow::{bail, Context, Result};

pub const DEFAULT_LLM_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_LLM_MODEL: &str = "llama-3.1-8b-instant";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Which insight backend answers analysis prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiBackend {
    /// Real chat-completions endpoint.
    Live,
    /// Deterministic canned insights, no network.
    Mock,
}

impl AiBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiBackend::Live => "live",
            AiBackend::Mock => "mock",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrBackend {
    Tesseract,
    /// Picks a canned label by image hash. Used by the demo deployment.
    Sample,
}

impl OcrBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrBackend::Tesseract => "tesseract",
            OcrBackend::Sample => "sample",
        }
    }
}

/// Application configuration loaded from environment variables.
/// Fails at startup on invalid values or a live AI backend without a key.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub ai_backend: AiBackend,
    pub llm_api_key: Option<String>,
    pub llm_api_url: String,
    pub llm_model: String,
    pub ocr_backend: OcrBackend,
    pub tesseract_cmd: String,
    pub ocr_language: String,
    pub max_upload_bytes: usize,
    pub rate_limit_per_minute: u32,
    pub session_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let llm_api_key = optional_env("GROQ_API_KEY");
        let ai_backend = match optional_env("AI_BACKEND").as_deref() {
            Some(raw) => parse_ai_backend(raw)?,
            None if llm_api_key.is_some() => AiBackend::Live,
            None => AiBackend::Mock,
        };
        if ai_backend == AiBackend::Live && llm_api_key.is_none() {
            bail!("AI_BACKEND=live requires GROQ_API_KEY to be set");
        }

        let ocr_backend = match optional_env("OCR_BACKEND").as_deref() {
            Some(raw) => parse_ocr_backend(raw)?,
            None => OcrBackend::Tesseract,
        };

        Ok(Config {
            port: parse_env("PORT", 8501)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            ai_backend,
            llm_api_key,
            llm_api_url: optional_env("LLM_API_URL")
                .unwrap_or_else(|| DEFAULT_LLM_API_URL.to_string()),
            llm_model: optional_env("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            ocr_backend,
            tesseract_cmd: optional_env("TESSERACT_CMD")
                .unwrap_or_else(|| "tesseract".to_string()),
            ocr_language: optional_env("OCR_LANGUAGE").unwrap_or_else(|| "eng".to_string()),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            rate_limit_per_minute: parse_env("RATE_LIMIT_PER_MINUTE", 60)?,
            session_ttl_secs: parse_env("SESSION_TTL_SECS", 3600)?,
        })
    }

    /// Configuration used by router tests: mock AI, sample OCR, no key.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            port: 0,
            rust_log: "debug".to_string(),
            ai_backend: AiBackend::Mock,
            llm_api_key: None,
            llm_api_url: DEFAULT_LLM_API_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            ocr_backend: OcrBackend::Sample,
            tesseract_cmd: "tesseract".to_string(),
            ocr_language: "eng".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            rate_limit_per_minute: 1000,
            session_ttl_secs: 3600,
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .ok()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        None => Ok(default),
    }
}

fn parse_ai_backend(raw: &str) -> Result<AiBackend> {
    match raw.trim().to_lowercase().as_str() {
        "live" | "groq" => Ok(AiBackend::Live),
        "mock" | "demo" => Ok(AiBackend::Mock),
        other => bail!("AI_BACKEND must be 'live' or 'mock', got '{other}'"),
    }
}

fn parse_ocr_backend(raw: &str) -> Result<OcrBackend> {
    match raw.trim().to_lowercase().as_str() {
        "tesseract" => Ok(OcrBackend::Tesseract),
        "sample" | "demo" => Ok(OcrBackend::Sample),
        other => bail!("OCR_BACKEND must be 'tesseract' or 'sample', got '{other}'"),
    }
}
