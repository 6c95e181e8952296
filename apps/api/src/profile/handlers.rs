//! Axum route handlers for session profiles.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::analysis::models::{AnalysisSummary, UserProfile};
use crate::errors::AppError;
use crate::routes::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SessionProfile {
    pub session_id: Uuid,
    pub profile: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct SessionHistory {
    pub session_id: Uuid,
    pub total: usize,
    pub analyses: Vec<AnalysisSummary>,
}

fn session_not_found(session_id: Uuid) -> AppError {
    AppError::NotFound(format!("Session {session_id} not found or expired"))
}

/// POST /api/v1/profile
///
/// Opens a session holding the given profile.
pub async fn handle_create_profile(
    State(state): State<AppState>,
    Json(profile): Json<UserProfile>,
) -> (StatusCode, Json<ApiResponse<SessionProfile>>) {
    let profile = profile.normalized();
    let session_id = state.sessions.create_session(profile.clone()).await;
    (
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            "Profile saved",
            SessionProfile {
                session_id,
                profile,
            },
        )),
    )
}

/// GET /api/v1/profile/:session_id
pub async fn handle_get_profile(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ApiResponse<SessionProfile>>, AppError> {
    let profile = state
        .sessions
        .get_profile(session_id)
        .await
        .ok_or_else(|| session_not_found(session_id))?;
    Ok(Json(ApiResponse::ok(
        "Profile retrieved",
        SessionProfile {
            session_id,
            profile,
        },
    )))
}

/// PUT /api/v1/profile/:session_id
pub async fn handle_update_profile(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(profile): Json<UserProfile>,
) -> Result<Json<ApiResponse<SessionProfile>>, AppError> {
    let profile = profile.normalized();
    if !state
        .sessions
        .update_profile(session_id, profile.clone())
        .await
    {
        return Err(session_not_found(session_id));
    }
    Ok(Json(ApiResponse::ok(
        "Profile updated",
        SessionProfile {
            session_id,
            profile,
        },
    )))
}

/// GET /api/v1/profile/:session_id/history
pub async fn handle_history(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ApiResponse<SessionHistory>>, AppError> {
    let analyses = state
        .sessions
        .history(session_id)
        .await
        .ok_or_else(|| session_not_found(session_id))?;
    Ok(Json(ApiResponse::ok(
        "History retrieved",
        SessionHistory {
            session_id,
            total: analyses.len(),
            analyses,
        },
    )))
}
