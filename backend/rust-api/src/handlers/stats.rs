use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::ApiError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::{
        session::{ReplaceSelectionsRequest, SessionStatus},
        stats::{RecordCompletionRequest, StatsView},
    },
    services::{
        session_service::{Owner, SessionService},
        stats_service::StatsService,
        AppState,
    },
};

/// Body of the tries endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriesResponse {
    pub tries_remaining: u32,
    pub status: SessionStatus,
}

fn stats_service(state: &AppState) -> StatsService {
    StatsService::new(state.stats.clone())
}

fn session_service(state: &AppState) -> SessionService {
    SessionService::new(
        state.puzzles.clone(),
        state.sessions.clone(),
        state.stats.clone(),
        state.cache.clone(),
    )
}

/// `{user_id}` routes serve the caller's own record; admins may read and
/// repair anyone's.
fn ensure_self_or_admin(claims: &JwtClaims, user_id: &str) -> Result<(), ApiError> {
    if claims.sub == user_id || claims.role == "admin" {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "You may only access your own statistics",
        ))
    }
}

/// GET /stats/{user_id} - Lifetime aggregates, zero-filled for new players
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(user_id): Path<String>,
) -> Result<Json<StatsView>, ApiError> {
    ensure_self_or_admin(&claims, &user_id)?;

    let stats = stats_service(&state)
        .get_or_default(&user_id, Utc::now())
        .await?;
    Ok(Json(StatsView::from(stats)))
}

/// PUT /stats/{user_id} - Fold one completed puzzle into the record
pub async fn record_completion(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(user_id): Path<String>,
    AppJson(req): AppJson<RecordCompletionRequest>,
) -> Result<Json<StatsView>, ApiError> {
    ensure_self_or_admin(&claims, &user_id)?;
    req.validate()?;

    let stats = stats_service(&state)
        .record_completion(&user_id, req.correct_answers, req.total_questions, Utc::now())
        .await?;
    Ok(Json(StatsView::from(stats)))
}

/// PUT /stats/{user_id}/reset - Overwrite with a zeroed record
pub async fn reset_stats(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(user_id): Path<String>,
) -> Result<Json<StatsView>, ApiError> {
    ensure_self_or_admin(&claims, &user_id)?;

    let stats = stats_service(&state).reset(&user_id, Utc::now()).await?;
    Ok(Json(StatsView::from(stats)))
}

/// DELETE /stats/{user_id} - Drop the record entirely
pub async fn delete_stats(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_self_or_admin(&claims, &user_id)?;

    let deleted = stats_service(&state).delete(&user_id).await?;
    Ok((StatusCode::OK, Json(json!({ "deleted": deleted }))))
}

/// GET /stats/selections - Today's saved selections for the caller
pub async fn get_selections(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = Owner::User(claims.sub);
    let selections = session_service(&state)
        .selections(&owner, Utc::now())
        .await?;
    Ok(Json(json!({ "selections": selections })))
}

/// PUT /stats/selections - Replace today's selections in one write
pub async fn put_selections(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<ReplaceSelectionsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = Owner::User(claims.sub);
    let selections = session_service(&state)
        .replace_selections(&owner, req.selections, Utc::now())
        .await?;
    Ok(Json(json!({ "selections": selections })))
}

/// PUT /stats/tries/decrement - Burn one try (client-driven quit paths)
pub async fn decrement_tries(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<TriesResponse>, ApiError> {
    let owner = Owner::User(claims.sub);
    let session = session_service(&state)
        .decrement_tries(&owner, Utc::now())
        .await?;
    Ok(Json(TriesResponse {
        tries_remaining: session.tries_remaining,
        status: session.status,
    }))
}

/// PUT /stats/tries/reset - Restore the full try budget while playable
pub async fn reset_tries(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<TriesResponse>, ApiError> {
    let owner = Owner::User(claims.sub);
    let session = session_service(&state)
        .reset_tries(&owner, Utc::now())
        .await?;
    Ok(Json(TriesResponse {
        tries_remaining: session.tries_remaining,
        status: session.status,
    }))
}
