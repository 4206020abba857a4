use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::ApiError,
    extractors::{AppJson, MaybeClaims},
    metrics::DAILY_PUZZLES_SERVED_TOTAL,
    middlewares::auth::JwtClaims,
    models::session::SelectRequest,
    services::{
        puzzle_service::PuzzleService,
        session_service::{Owner, SessionService},
        AppState,
    },
};

const GUEST_COOKIE: &str = "guest_token";

fn session_service(state: &AppState) -> SessionService {
    SessionService::new(
        state.puzzles.clone(),
        state.sessions.clone(),
        state.stats.clone(),
        state.cache.clone(),
    )
}

/// Caller identity for the game routes: JWT claims when present, otherwise
/// the guest cookie, minted here on first contact.
fn resolve_owner(claims: Option<JwtClaims>, jar: CookieJar) -> (Owner, CookieJar) {
    if let Some(claims) = claims {
        return (Owner::User(claims.sub), jar);
    }
    if let Some(cookie) = jar.get(GUEST_COOKIE) {
        return (Owner::Guest(cookie.value().to_string()), jar);
    }
    let token = Uuid::new_v4().to_string();
    tracing::debug!("Minted guest token for anonymous player");
    let cookie = Cookie::build((GUEST_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(48))
        .build();
    (Owner::Guest(token), jar.add(cookie))
}

/// GET /game/daily-puzzle - Today's five pairs, 404 until fully scheduled
pub async fn daily_puzzle(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let service = PuzzleService::new(state.puzzles.clone());
    match service.daily_puzzle(Utc::now()).await {
        Ok(puzzle) => {
            DAILY_PUZZLES_SERVED_TOTAL
                .with_label_values(&["served"])
                .inc();
            Ok(Json(puzzle))
        }
        Err(e) => {
            if e.status_code() == StatusCode::NOT_FOUND {
                DAILY_PUZZLES_SERVED_TOTAL
                    .with_label_values(&["unavailable"])
                    .inc();
            }
            Err(e)
        }
    }
}

/// GET /game/session - Today's session for the caller, created on first touch
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    MaybeClaims(claims): MaybeClaims,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let (owner, jar) = resolve_owner(claims, jar);
    let view = session_service(&state)
        .current_session(&owner, Utc::now())
        .await?;
    Ok((jar, Json(view)))
}

/// POST /game/session/select - Record one choice without consuming a try
pub async fn select(
    State(state): State<Arc<AppState>>,
    MaybeClaims(claims): MaybeClaims,
    jar: CookieJar,
    AppJson(req): AppJson<SelectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let (owner, jar) = resolve_owner(claims, jar);
    let view = session_service(&state)
        .select(&owner, req.pair_index, &req.selected_image_url, Utc::now())
        .await?;
    Ok((jar, Json(view)))
}

/// POST /game/session/submit - Grade the board against today's pairs
pub async fn submit(
    State(state): State<Arc<AppState>>,
    MaybeClaims(claims): MaybeClaims,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let (owner, jar) = resolve_owner(claims, jar);
    let response = session_service(&state).submit(&owner, Utc::now()).await?;
    Ok((jar, Json(response)))
}
