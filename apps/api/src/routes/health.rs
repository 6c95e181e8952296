use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::middleware::MetricsSnapshot;
use crate::routes::ApiResponse;
use crate::sessions::StoreStats;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MetricsReport {
    pub timestamp: DateTime<Utc>,
    pub application: MetricsSnapshot,
    pub store: StoreStats,
}

/// GET /health
/// Returns service status, version and the active backends.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": env!("CARGO_PKG_NAME"),
        "ai_backend": state.advisor.backend(),
        "model": state.advisor.model_version(),
        "ocr_backend": state.ocr.name(),
        "active_sessions": state.sessions.session_count().await,
    }))
}

/// GET /api/v1/health/metrics
/// Request counters from the metrics middleware plus session store totals.
pub async fn metrics_handler(State(state): State<AppState>) -> Json<ApiResponse<MetricsReport>> {
    Json(ApiResponse::ok(
        "Metrics retrieved successfully",
        MetricsReport {
            timestamp: Utc::now(),
            application: state.metrics.snapshot().await,
            store: state.sessions.stats().await,
        },
    ))
}

/// GET /api/v1/health/status
/// Checks each backend; `overall_status` is "degraded" when any is unhealthy.
pub async fn status_handler(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    let ocr = match state.ocr.health_check().await {
        Ok(version) => json!({
            "status": "healthy",
            "backend": state.ocr.name(),
            "version": version,
        }),
        Err(e) => {
            warn!("OCR health check failed: {e}");
            json!({
                "status": "unhealthy",
                "backend": state.ocr.name(),
                "error": e.to_string(),
            })
        }
    };
    // The live model is not pinged; a configured client counts as healthy.
    let analysis = json!({
        "status": "healthy",
        "backend": state.advisor.backend(),
        "model": state.advisor.model_version(),
    });

    let overall_status = if ocr["status"] == "healthy" && analysis["status"] == "healthy" {
        "healthy"
    } else {
        "degraded"
    };

    Json(ApiResponse::ok(
        "Service status retrieved",
        json!({
            "timestamp": Utc::now(),
            "overall_status": overall_status,
            "services": {
                "ocr": ocr,
                "analysis": analysis,
            },
            "configuration": {
                "rate_limit_per_minute": state.config.rate_limit_per_minute,
                "max_upload_bytes": state.config.max_upload_bytes,
                "session_ttl_secs": state.config.session_ttl_secs,
            }
        }),
    ))
}

/// GET /api/v1/info
pub async fn info_handler() -> Json<Value> {
    Json(json!({
        "name": "Food Label Analyzer API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Nutrition label OCR, additive detection and personalized health insights",
        "features": [
            "Label image OCR",
            "Nutrition facts parsing",
            "Chemical additive detection",
            "Allergen and health condition warnings",
            "AI-generated insights",
            "Markdown reports",
            "Image preprocessing and quality checks",
            "Request metrics"
        ],
        "endpoints": {
            "analyze": "POST /api/v1/analysis/analyze",
            "analyze_text": "POST /api/v1/analysis/analyze-text",
            "quick": "POST /api/v1/analysis/quick",
            "validate_image": "POST /api/v1/analysis/validate-image",
            "get_analysis": "GET /api/v1/analysis/:id",
            "report": "GET /api/v1/analysis/:id/report?format=json|markdown",
            "feedback": "POST /api/v1/analysis/feedback",
            "list_feedback": "GET /api/v1/analysis/:id/feedback",
            "create_profile": "POST /api/v1/profile",
            "profile": "GET|PUT /api/v1/profile/:session_id",
            "history": "GET /api/v1/profile/:session_id/history",
            "health": "GET /health",
            "metrics": "GET /api/v1/health/metrics",
            "status": "GET /api/v1/health/status"
        }
    }))
}
