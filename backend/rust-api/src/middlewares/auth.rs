use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::services::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    pub sub: String,   // user_id
    pub email: String, // normalized (lowercased) email
    pub role: String,  // user role (player, admin)
    pub exp: usize,    // expiration timestamp
    pub iat: usize,    // issued at timestamp
}

#[derive(Debug)]
pub enum AuthError {
    InvalidToken,
    ExpiredToken,
    MissingToken,
    InvalidSignature,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidToken => write!(f, "Invalid token"),
            AuthError::ExpiredToken => write!(f, "Token expired"),
            AuthError::MissingToken => write!(f, "Missing authorization token"),
            AuthError::InvalidSignature => write!(f, "Invalid token signature"),
        }
    }
}

impl std::error::Error for AuthError {}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn generate_token(&self, claims: JwtClaims) -> Result<String, AuthError> {
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|_| AuthError::InvalidToken)
    }

    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let validation = Validation::default();

        decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                if e.to_string().contains("ExpiredSignature") {
                    AuthError::ExpiredToken
                } else if e.to_string().contains("InvalidSignature") {
                    AuthError::InvalidSignature
                } else {
                    AuthError::InvalidToken
                }
            })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Requires a valid JWT and stores the claims in request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authorization token"))?;

    let claims = state.jwt.validate_token(token).map_err(|e| {
        tracing::warn!("JWT validation failed: {}", e);
        ApiError::unauthorized("Invalid or expired token")
    })?;

    tracing::debug!("Authenticated user: {} (role: {})", claims.sub, claims.role);

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Optional auth - allows requests without token, but validates if present
pub async fn optional_auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(&headers) {
        if let Ok(claims) = state.jwt.validate_token(token) {
            request.extensions_mut().insert(claims);
        }
    }

    next.run(request).await
}

pub async fn admin_guard_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    let claims = request.extensions().get::<JwtClaims>();
    if let Some(claims) = claims {
        if claims.role == "admin" {
            return Ok(next.run(request).await);
        }
    }
    tracing::warn!("Access denied: admin role required");
    Err(ApiError::forbidden("Admin role required"))
}
