use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::ApiError,
    extractors::AppJson,
    models::user::{RequestOtpRequest, VerifyOtpRequest},
    services::{auth_service::AuthService, otp_store::OtpStore, AppState},
};

fn auth_service(state: &AppState) -> AuthService {
    let otp_store = OtpStore::new(state.cache.clone(), state.config.otp.clone());
    AuthService::new(
        state.users.clone(),
        otp_store,
        state.otp_sender.clone(),
        state.jwt.clone(),
        state.config.clone(),
    )
}

/// POST /auth/request-otp - Issue a one-time login code for an email address
pub async fn request_otp(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RequestOtpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let service = auth_service(&state);
    service.request_otp(&req.email).await?;

    // The response never reveals whether the address is already registered.
    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Verification code sent" })),
    ))
}

/// POST /auth/verify-otp - Exchange a one-time code for an access token
pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<VerifyOtpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let service = auth_service(&state);
    let response = service.verify_otp(req).await?;

    tracing::info!(email = %response.user.email, "User logged in");
    Ok((StatusCode::OK, Json(response)))
}
