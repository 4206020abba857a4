use std::convert::Infallible;

use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::ApiError;
use crate::middlewares::auth::JwtClaims;

/// Custom JSON extractor that returns JSON error responses instead of HTML
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => {
                let message = format!("Failed to parse JSON request body: {}", rejection);
                tracing::warn!("{}", message);
                Err(ApiError::validation(message).into_response())
            }
        }
    }
}

/// Claims left in request extensions by the optional-auth middleware. `None`
/// when the caller sent no token (or an invalid one), so the handler can fall
/// back to the guest identity.
pub struct MaybeClaims(pub Option<JwtClaims>);

impl<S> FromRequestParts<S> for MaybeClaims
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeClaims(parts.extensions.get::<JwtClaims>().cloned()))
    }
}
