use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::auth::{jwt, password};
use crate::entities::account;
use crate::error::AppError;
use crate::invites::normalize_email;
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Build the auth route group: `/auth/...`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/signin", post(signin))
        .route("/signout", post(signout))
        .route("/me", get(me))
}

// ─────────────────────────────────────────────────────────────────────────────
// DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: AccountResponse,
    pub token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub id: Uuid,
    pub email: String,
    pub created_at: String,
}

fn account_response(a: &account::Model) -> AccountResponse {
    AccountResponse {
        id: a.id,
        email: a.email.clone(),
        created_at: a.created_at.to_rfc3339(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `POST /api/v1/auth/signup` — Register a new account with email + password.
async fn signup(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    password::validate_email(&body.email).map_err(AppError::BadRequest)?;
    password::validate_password(&body.password).map_err(AppError::BadRequest)?;

    let email = normalize_email(&body.email);

    let existing = account::Entity::find()
        .filter(account::Column::Email.eq(&email))
        .one(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    if existing.is_some() {
        return Err(AppError::Conflict("Email is already registered.".to_string()));
    }

    let password_hash = password::hash_password(&body.password)?;
    let now = Utc::now().fixed_offset();

    let new_account = account::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        password_hash: Set(password_hash),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let inserted = new_account
        .insert(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    let token = jwt::generate_access_token(inserted.id, &state.config)?;

    tracing::info!(account_id = %inserted.id, "account created");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: account_response(&inserted),
            token,
        }),
    ))
}

/// `POST /api/v1/auth/signin` — Exchange credentials for an access token.
async fn signin(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let email = normalize_email(&body.email);

    let found = account::Entity::find()
        .filter(account::Column::Email.eq(&email))
        .one(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password.".to_string()))?;

    let valid = password::verify_password(&body.password, &found.password_hash)?;
    if !valid {
        return Err(AppError::Unauthorized("Invalid email or password.".to_string()));
    }

    let token = jwt::generate_access_token(found.id, &state.config)?;

    Ok(Json(AuthResponse {
        user: account_response(&found),
        token,
    }))
}

/// `POST /api/v1/auth/signout` — End the session.
///
/// Access tokens are stateless, so there is nothing to revoke server-side;
/// the route exists so clients have a single place to end a session.
async fn signout(AuthUser(_account): AuthUser) -> StatusCode {
    StatusCode::NO_CONTENT
}

/// `GET /api/v1/auth/me` — The current account.
async fn me(AuthUser(current): AuthUser) -> Json<AccountResponse> {
    Json(account_response(&current))
}
