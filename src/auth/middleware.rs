use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sea_orm::EntityTrait;

use crate::auth::jwt;
use crate::entities::account;
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated account extracted from the `Authorization: Bearer <token>` header.
///
/// Use as an extractor in handler parameters to require authentication:
/// ```ignore
/// async fn handler(AuthUser(account): AuthUser) -> impl IntoResponse { ... }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser(pub account::Model);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing authorization header.".to_string()))?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Unauthorized("Invalid authorization header format.".to_string())
        })?;

        let account_model = resolve_token(state, token).await?;
        Ok(Self(account_model))
    }
}

/// Resolve a raw access token to its account row.
///
/// Shared between the bearer-header extractor and the WebSocket route,
/// which carries the token as a query parameter instead.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` when the token is invalid, expired,
/// or references an account that no longer exists.
pub async fn resolve_token(state: &AppState, token: &str) -> Result<account::Model, AppError> {
    let claims = jwt::validate_access_token(token, &state.config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token.".to_string()))?;

    let account_id: uuid::Uuid = claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized("Invalid token subject.".to_string()))?;

    account::Entity::find_by_id(account_id)
        .one(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .ok_or_else(|| AppError::Unauthorized("Account not found.".to_string()))
}
