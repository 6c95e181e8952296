//! Axum route handlers for the Analysis API.

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::insights::{extract_health_score, score_verdict, ScoreVerdict};
use crate::analysis::models::{AnalysisResult, Feedback, FeedbackType, UserProfile};
use crate::analysis::prompts::build_quick_prompt;
use crate::analysis::render::{render_report, AnalysisReport};
use crate::analysis::service::{analyze_label, LabelInput};
use crate::errors::AppError;
use crate::ocr::preprocess::assess_bytes;
use crate::ocr::{
    detect_image_format, validate_extraction, ExtractionValidation, ImageFormat, ImageQuality,
    OcrError, Preprocessing,
};
use crate::routes::ApiResponse;
use crate::state::AppState;

const MAX_COMMENT_CHARS: usize = 2000;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AnalyzeTextRequest {
    pub extracted_text: String,
    #[serde(default)]
    pub user_profile: Option<UserProfile>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct QuickRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct QuickAssessment {
    pub assessment: String,
    pub health_score: Option<f64>,
    pub verdict: Option<ScoreVerdict>,
    pub verdict_label: Option<&'static str>,
    pub model_version: String,
}

#[derive(Debug, Serialize)]
pub struct ImageValidation {
    pub format: ImageFormat,
    pub mime_type: &'static str,
    pub size_bytes: usize,
    /// `None` when the bytes carry an image signature but do not decode.
    pub quality: Option<ImageQuality>,
    pub image_hash: Option<String>,
    pub ocr_confidence: Option<f32>,
    pub method_used: Option<String>,
    pub preprocessing: Option<Preprocessing>,
    pub preprocessing_steps: &'static [&'static str],
    pub extracted_text: String,
    pub validation: ExtractionValidation,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub analysis_id: Uuid,
    pub feedback_type: FeedbackType,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub feedback_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct FeedbackList {
    pub analysis_id: Uuid,
    pub total: usize,
    pub feedback: Vec<Feedback>,
}

/// Fields collected from an upload form.
#[derive(Default)]
struct UploadForm {
    file: Option<Bytes>,
    user_profile: Option<UserProfile>,
    session_id: Option<Uuid>,
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Upload exceeds the size limit".to_string())
    } else {
        AppError::Validation(format!("Invalid multipart body: {}", e.body_text()))
    }
}

async fn read_upload_form(mut multipart: Multipart, max_bytes: usize) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let data = field.bytes().await.map_err(multipart_error)?;
                if data.len() > max_bytes {
                    return Err(AppError::PayloadTooLarge(format!(
                        "File is {} bytes; the limit is {} bytes",
                        data.len(),
                        max_bytes
                    )));
                }
                form.file = Some(data);
            }
            "user_profile" => {
                let raw = field.text().await.map_err(multipart_error)?;
                if !raw.trim().is_empty() {
                    let profile = serde_json::from_str::<UserProfile>(&raw).map_err(|e| {
                        AppError::Validation(format!("user_profile is not valid JSON: {e}"))
                    })?;
                    form.user_profile = Some(profile);
                }
            }
            "session_id" => {
                let raw = field.text().await.map_err(multipart_error)?;
                if !raw.trim().is_empty() {
                    let id = Uuid::parse_str(raw.trim()).map_err(|_| {
                        AppError::Validation("session_id must be a UUID".to_string())
                    })?;
                    form.session_id = Some(id);
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

fn require_image(file: Option<Bytes>) -> Result<(Bytes, ImageFormat), AppError> {
    let data = file
        .filter(|d| !d.is_empty())
        .ok_or_else(|| AppError::Validation("A non-empty 'file' field is required".to_string()))?;
    let format = detect_image_format(&data).ok_or_else(|| {
        AppError::UnsupportedMedia("Only PNG, JPEG and WEBP images are supported".to_string())
    })?;
    Ok((data, format))
}

/// A given `session_id` must name a live session, even when the request
/// carries its own profile. An explicit profile wins over the stored one.
async fn resolve_profile(
    state: &AppState,
    explicit: Option<UserProfile>,
    session_id: Option<Uuid>,
) -> Result<Option<UserProfile>, AppError> {
    let stored = match session_id {
        Some(id) => Some(
            state
                .sessions
                .get_profile(id)
                .await
                .ok_or_else(|| AppError::NotFound(format!("Session {id} not found or expired")))?,
        ),
        None => None,
    };
    Ok(explicit.map(UserProfile::normalized).or(stored))
}

async fn run_and_store(
    state: &AppState,
    text: &str,
    profile: Option<UserProfile>,
    session_id: Option<Uuid>,
    ocr_confidence: Option<f32>,
) -> Result<AnalysisResult, AppError> {
    let result = analyze_label(
        LabelInput {
            text,
            profile: profile.as_ref(),
            session_id,
            ocr_confidence,
        },
        state.advisor.as_ref(),
    )
    .await?;
    state.sessions.record_analysis(result.clone()).await;
    Ok(result)
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/analysis/analyze
///
/// Multipart upload: `file` (PNG/JPEG/WEBP), optional `user_profile` JSON and `session_id`.
/// Runs OCR, then the full label analysis.
pub async fn handle_analyze_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<AnalysisResult>>, AppError> {
    let form = read_upload_form(multipart, state.config.max_upload_bytes).await?;
    let (image, format) = require_image(form.file)?;
    let profile = resolve_profile(&state, form.user_profile, form.session_id).await?;

    info!("Running OCR on {} byte {:?} image", image.len(), format);
    let ocr = state.ocr.extract(&image).await?;

    let validation = validate_extraction(&ocr.text);
    if !validation.is_valid {
        warn!(issues = ?validation.issues, "Extracted text does not look like a nutrition label");
    }

    let result = run_and_store(
        &state,
        &ocr.text,
        profile,
        form.session_id,
        Some(ocr.confidence),
    )
    .await?;

    Ok(Json(ApiResponse::ok("Analysis completed successfully", result)))
}

/// POST /api/v1/analysis/analyze-text
///
/// Analyzes already-extracted label text.
pub async fn handle_analyze_text(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeTextRequest>,
) -> Result<Json<ApiResponse<AnalysisResult>>, AppError> {
    if request.extracted_text.trim().is_empty() {
        return Err(AppError::Validation(
            "extracted_text cannot be empty".to_string(),
        ));
    }

    let profile = resolve_profile(&state, request.user_profile, request.session_id).await?;
    let result = run_and_store(
        &state,
        &request.extracted_text,
        profile,
        request.session_id,
        None,
    )
    .await?;

    Ok(Json(ApiResponse::ok("Text analysis completed successfully", result)))
}

/// POST /api/v1/analysis/quick
///
/// Free-text assessment with the score pulled out of the reply.
pub async fn handle_quick(
    State(state): State<AppState>,
    Json(request): Json<QuickRequest>,
) -> Result<Json<ApiResponse<QuickAssessment>>, AppError> {
    if request.text.trim().is_empty() {
        return Err(AppError::Validation("text cannot be empty".to_string()));
    }

    let prompt = build_quick_prompt(&request.text);
    let assessment = state.advisor.assess(&prompt, &request.text).await?;
    let health_score = extract_health_score(&assessment);
    let verdict = health_score.map(score_verdict);

    Ok(Json(ApiResponse::ok(
        "Quick assessment completed",
        QuickAssessment {
            assessment,
            health_score,
            verdict,
            verdict_label: verdict.map(|v| v.label()),
            model_version: state.advisor.model_version(),
        },
    )))
}

/// POST /api/v1/analysis/validate-image
///
/// Checks that an upload is a supported image, scores how readable it is,
/// and reports whether OCR finds label-like text.
pub async fn handle_validate_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<ImageValidation>>, AppError> {
    let form = read_upload_form(multipart, state.config.max_upload_bytes).await?;
    let (image, format) = require_image(form.file)?;

    let bytes = image.clone();
    let quality = match tokio::task::spawn_blocking(move || assess_bytes(&bytes)).await {
        Ok(Ok(quality)) => Some(quality),
        Ok(Err(e)) => {
            warn!("Skipping image quality check: {e}");
            None
        }
        Err(e) => {
            warn!("Image quality task failed: {e}");
            None
        }
    };

    let ocr = match state.ocr.extract(&image).await {
        Ok(ocr) => Some(ocr),
        Err(OcrError::NoText) => None,
        Err(e) => return Err(e.into()),
    };

    let extracted_text = ocr.as_ref().map(|o| o.text.clone()).unwrap_or_default();
    let mut validation = validate_extraction(&extracted_text);
    if quality.is_none() {
        validation
            .issues
            .push("Image could not be decoded for a quality check".to_string());
    }

    let response = ImageValidation {
        format,
        mime_type: format.mime(),
        size_bytes: image.len(),
        quality,
        image_hash: ocr.as_ref().map(|o| o.image_hash.clone()),
        ocr_confidence: ocr.as_ref().map(|o| o.confidence),
        method_used: ocr.as_ref().map(|o| o.method_used.clone()),
        preprocessing: ocr.as_ref().map(|o| o.preprocessing),
        preprocessing_steps: ocr
            .as_ref()
            .map(|o| o.preprocessing.steps())
            .unwrap_or_default(),
        extracted_text,
        validation,
    };

    let message = if response.validation.is_valid {
        "Image looks like a nutrition label"
    } else {
        "Image may not be a readable nutrition label"
    };
    Ok(Json(ApiResponse::ok(message, response)))
}

/// GET /api/v1/analysis/:id
pub async fn handle_get_analysis(
    State(state): State<AppState>,
    Path(analysis_id): Path<Uuid>,
) -> Result<Json<ApiResponse<AnalysisResult>>, AppError> {
    let result = state
        .sessions
        .get_analysis(analysis_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Analysis {analysis_id} not found")))?;
    Ok(Json(ApiResponse::ok("Analysis retrieved", result)))
}

/// GET /api/v1/analysis/:id/report?format=json|markdown
pub async fn handle_get_report(
    State(state): State<AppState>,
    Path(analysis_id): Path<Uuid>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, AppError> {
    let result = state
        .sessions
        .get_analysis(analysis_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Analysis {analysis_id} not found")))?;
    let report: AnalysisReport = render_report(&result);

    match query.format.as_deref().unwrap_or("json") {
        "json" => Ok(Json(ApiResponse::ok("Report rendered", report)).into_response()),
        "markdown" | "md" => Ok((
            [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
            report.to_markdown(),
        )
            .into_response()),
        other => Err(AppError::Validation(format!(
            "Unknown report format '{other}', expected 'json' or 'markdown'"
        ))),
    }
}

/// POST /api/v1/analysis/feedback
pub async fn handle_feedback(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<ApiResponse<FeedbackResponse>>, AppError> {
    if let Some(rating) = request.rating {
        if !(1..=5).contains(&rating) {
            return Err(AppError::Validation(
                "rating must be between 1 and 5".to_string(),
            ));
        }
    }
    let comment = request
        .comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if comment
        .as_ref()
        .is_some_and(|c| c.chars().count() > MAX_COMMENT_CHARS)
    {
        return Err(AppError::Validation(format!(
            "comment must be at most {MAX_COMMENT_CHARS} characters"
        )));
    }

    if state.sessions.get_analysis(request.analysis_id).await.is_none() {
        return Err(AppError::NotFound(format!(
            "Analysis {} not found",
            request.analysis_id
        )));
    }

    let feedback_id = Uuid::new_v4();
    state
        .sessions
        .add_feedback(Feedback {
            feedback_id,
            analysis_id: request.analysis_id,
            feedback_type: request.feedback_type,
            rating: request.rating,
            comment,
            created_at: Utc::now(),
        })
        .await;

    Ok(Json(ApiResponse::ok(
        "Feedback submitted successfully",
        FeedbackResponse { feedback_id },
    )))
}

/// GET /api/v1/analysis/:id/feedback
pub async fn handle_list_feedback(
    State(state): State<AppState>,
    Path(analysis_id): Path<Uuid>,
) -> Result<Json<ApiResponse<FeedbackList>>, AppError> {
    if state.sessions.get_analysis(analysis_id).await.is_none() {
        return Err(AppError::NotFound(format!("Analysis {analysis_id} not found")));
    }
    let feedback = state.sessions.feedback_for(analysis_id).await;
    Ok(Json(ApiResponse::ok(
        "Feedback retrieved",
        FeedbackList {
            analysis_id,
            total: feedback.len(),
            feedback,
        },
    )))
}
