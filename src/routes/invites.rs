use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::entities::account;
use crate::error::AppError;
use crate::invites;
use crate::invites::AcceptOutcome;
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Build the invite route group: `/invites/...`
///
/// Game-scoped creation/listing lives under `/games/{id}/invites`; this
/// group carries the recipient-side operations.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pending", get(pending_invites))
        .route("/accept", post(accept_invite))
        .route("/{id}/decline", post(decline_invite))
        .route("/{id}", delete(cancel_invite))
}

// ─────────────────────────────────────────────────────────────────────────────
// DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcceptInviteRequest {
    code: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PendingInviteResponse {
    id: Uuid,
    game_id: Uuid,
    invite_code: String,
    invited_email: String,
    invited_by_email: Option<String>,
    expires_at: String,
    created_at: String,
    game: GameSummary,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GameSummary {
    id: Uuid,
    name: String,
    season: String,
    fine_amount: f64,
    currency: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /api/v1/invites/pending` — The caller's inbox of open offers:
/// pending, unexpired invites addressed to their email.
async fn pending_invites(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
) -> Result<Json<Vec<PendingInviteResponse>>, AppError> {
    let pending = invites::pending_for_account(&state.db, &current).await?;

    let mut inviter_ids: Vec<Uuid> = pending.iter().map(|(i, _)| i.invited_by).collect();
    inviter_ids.sort_unstable();
    inviter_ids.dedup();

    let inviters: std::collections::HashMap<Uuid, String> = if inviter_ids.is_empty() {
        std::collections::HashMap::new()
    } else {
        account::Entity::find()
            .filter(account::Column::Id.is_in(inviter_ids))
            .all(&state.db)
            .await
            .map_err(|e| AppError::Internal(e.into()))?
            .into_iter()
            .map(|a| (a.id, a.email))
            .collect()
    };

    Ok(Json(
        pending
            .into_iter()
            .filter_map(|(invite, maybe_game)| {
                maybe_game.map(|g| PendingInviteResponse {
                    id: invite.id,
                    game_id: invite.game_id,
                    invite_code: invite.invite_code,
                    invited_email: invite.invited_email,
                    invited_by_email: inviters.get(&invite.invited_by).cloned(),
                    expires_at: invite.expires_at.to_rfc3339(),
                    created_at: invite.created_at.to_rfc3339(),
                    game: GameSummary {
                        id: g.id,
                        name: g.name,
                        season: g.season,
                        fine_amount: g.fine_amount,
                        currency: g.currency,
                    },
                })
            })
            .collect(),
    ))
}

/// `POST /api/v1/invites/accept` — Accept an invite by code.
///
/// Always answers 200: rejection of an expired, consumed, or unknown code is
/// an expected outcome and comes back as `success: false`, never an error.
async fn accept_invite(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Json(body): Json<AcceptInviteRequest>,
) -> Result<Json<AcceptOutcome>, AppError> {
    let outcome = invites::accept_invite(&state.db, &current, &body.code).await?;

    if outcome.success {
        tracing::info!(account_id = %current.id, "invite accepted");
    }

    Ok(Json(outcome))
}

/// `POST /api/v1/invites/{id}/decline` — Decline an invite addressed to the
/// caller. Declining an already-terminal invite is a no-op.
async fn decline_invite(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(invite_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    invites::decline_invite(&state.db, &current, invite_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/v1/invites/{id}` — Cancel (hard-delete) a pending invite.
/// Owner action, distinct from the recipient's decline.
async fn cancel_invite(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(invite_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    invites::cancel_invite(&state.db, &current, invite_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
