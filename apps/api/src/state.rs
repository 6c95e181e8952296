use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::analysis::advisor::{InsightAdvisor, LlmAdvisor, MockAdvisor};
use crate::config::{AiBackend, Config, OcrBackend};
use crate::llm_client::LlmClient;
use crate::middleware::{RateLimiter, RequestMetrics};
use crate::ocr::{OcrEngine, SampleOcr, TesseractOcr};
use crate::sessions::SessionStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Pluggable insight backend. `LlmAdvisor` when a key is configured, else `MockAdvisor`.
    pub advisor: Arc<dyn InsightAdvisor>,
    /// Pluggable OCR backend. `TesseractOcr` by default, `SampleOcr` for demos.
    pub ocr: Arc<dyn OcrEngine>,
    pub sessions: Arc<SessionStore>,
    pub rate_limiter: RateLimiter,
    pub metrics: RequestMetrics,
}

impl AppState {
    pub fn from_config(config: Config) -> Result<Self> {
        let advisor: Arc<dyn InsightAdvisor> = match config.ai_backend {
            AiBackend::Live => {
                let api_key = config
                    .llm_api_key
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("live AI backend requires an API key"))?;
                let llm = LlmClient::new(
                    api_key,
                    config.llm_api_url.clone(),
                    config.llm_model.clone(),
                )?;
                info!("LLM client initialized (model: {})", llm.model());
                Arc::new(LlmAdvisor(llm))
            }
            AiBackend::Mock => {
                info!("Using mock insight advisor (no API key configured)");
                Arc::new(MockAdvisor)
            }
        };

        let ocr: Arc<dyn OcrEngine> = match config.ocr_backend {
            OcrBackend::Tesseract => Arc::new(TesseractOcr::new(
                config.tesseract_cmd.clone(),
                config.ocr_language.clone(),
            )),
            OcrBackend::Sample => Arc::new(SampleOcr),
        };
        info!("OCR backend: {}", ocr.name());

        Ok(Self {
            sessions: Arc::new(SessionStore::new(Duration::from_secs(
                config.session_ttl_secs,
            ))),
            rate_limiter: RateLimiter::new(config.rate_limit_per_minute, Duration::from_secs(60)),
            metrics: RequestMetrics::new(),
            advisor,
            ocr,
            config,
        })
    }

    /// Mock advisor, sample OCR, generous rate limit.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::from_config(Config::for_tests()).expect("test config is valid")
    }
}
