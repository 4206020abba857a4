use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::ApiError,
    extractors::AppJson,
    models::puzzle::{ListPuzzlesQuery, SchedulePairRequest, PAIRS_PER_PUZZLE},
    models::DateKey,
    services::{
        object_storage::{extension_for, PairImageKind},
        puzzle_service::PuzzleService,
        AppState,
    },
};

/// Presigned PUT URLs stay valid just long enough for the admin frontend to
/// push one image.
const UPLOAD_URL_TTL: Duration = Duration::from_secs(900);

/// Body of `POST /admin/uploads`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadRequest {
    pub date: DateKey,
    pub pair_index: usize,
    pub kind: PairImageKind,
    #[validate(length(min = 1, message = "contentType must not be empty"))]
    pub content_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadResponse {
    pub upload_url: String,
    pub public_url: String,
    pub key: String,
    pub expires_in_seconds: u64,
}

fn puzzle_service(state: &AppState) -> PuzzleService {
    PuzzleService::new(state.puzzles.clone())
}

/// PUT /admin/puzzles/{date}/pairs/{index} - Schedule or replace one pair slot
pub async fn schedule_pair(
    State(state): State<Arc<AppState>>,
    Path((date, index)): Path<(DateKey, usize)>,
    AppJson(req): AppJson<SchedulePairRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let view = puzzle_service(&state)
        .schedule_pair(date, index, req, Utc::now())
        .await?;
    Ok(Json(view))
}

/// GET /admin/puzzles/{date} - One day with effective pair statuses
pub async fn get_puzzle(
    State(state): State<Arc<AppState>>,
    Path(date): Path<DateKey>,
) -> Result<impl IntoResponse, ApiError> {
    let view = puzzle_service(&state).admin_view(date, Utc::now()).await?;
    Ok(Json(view))
}

/// GET /admin/puzzles?from=YYYY-MM-DD&to=YYYY-MM-DD - Scheduled days in range
pub async fn list_puzzles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListPuzzlesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let views = puzzle_service(&state).list(query, Utc::now()).await?;
    Ok(Json(json!({ "puzzles": views })))
}

/// DELETE /admin/puzzles/{date} - Remove a future day entirely
pub async fn delete_puzzle(
    State(state): State<Arc<AppState>>,
    Path(date): Path<DateKey>,
) -> Result<impl IntoResponse, ApiError> {
    puzzle_service(&state).delete(date, Utc::now()).await?;
    Ok((
        StatusCode::OK,
        Json(json!({ "message": format!("Puzzle for {} deleted", date) })),
    ))
}

/// POST /admin/uploads - Presign a direct-to-bucket PUT for one pair image
pub async fn create_upload(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateUploadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let storage = state
        .object_storage
        .as_ref()
        .ok_or_else(|| ApiError::Store("Image uploads are not configured".to_string()))?;

    if req.pair_index >= PAIRS_PER_PUZZLE {
        return Err(ApiError::validation(format!(
            "pairIndex must be less than {}, got {}",
            PAIRS_PER_PUZZLE, req.pair_index
        )));
    }
    let extension = extension_for(&req.content_type).ok_or_else(|| {
        ApiError::validation(format!(
            "Unsupported content type {}; use image/jpeg, image/png or image/webp",
            req.content_type
        ))
    })?;

    let key = storage.build_pair_key(req.date, req.pair_index, req.kind, extension);
    let upload_url = storage.generate_presigned_upload_url(&key, &req.content_type, UPLOAD_URL_TTL)?;
    let public_url = storage.public_url(&key);

    tracing::info!(date = %req.date, pair_index = req.pair_index, kind = %req.kind.as_str(), "Presigned pair image upload");
    Ok(Json(CreateUploadResponse {
        upload_url,
        public_url,
        key,
        expires_in_seconds: UPLOAD_URL_TTL.as_secs(),
    }))
}
