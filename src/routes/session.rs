use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access;
use crate::auth::middleware::AuthUser;
use crate::entities::account;
use crate::error::AppError;
use crate::invites;
use crate::invites::AcceptOutcome;
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Build the session route group: `/session/...`
pub fn router() -> Router<AppState> {
    Router::new().route("/bootstrap", get(bootstrap))
}

// ─────────────────────────────────────────────────────────────────────────────
// DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct BootstrapQuery {
    /// Invite code carried by the entry context (e.g. a shared link).
    invite: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BootstrapResponse {
    games: Vec<GameWithRole>,
    pending_invites: Vec<PendingInvite>,
    accepted_invite: Option<AcceptOutcome>,
    /// Set when an entry invite was accepted: the client should open this
    /// game directly instead of showing the list.
    selected_game_id: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GameWithRole {
    id: Uuid,
    name: String,
    season: String,
    fine_amount: f64,
    currency: String,
    created_by: Uuid,
    created_at: String,
    updated_at: String,
    user_role: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PendingInvite {
    id: Uuid,
    game_id: Uuid,
    invite_code: String,
    game_name: String,
    invited_by_email: Option<String>,
    expires_at: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /api/v1/session/bootstrap?invite=CODE` — Everything a client needs
/// at startup, in one request.
///
/// When an invite code rides along it is consumed before anything else; on
/// success the response points at the invited game and skips the inbox
/// prompt. The code is consumed exactly once: replaying the same URL gets a
/// structured `success: false` and the normal game list.
async fn bootstrap(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Query(query): Query<BootstrapQuery>,
) -> Result<Json<BootstrapResponse>, AppError> {
    let accepted = match &query.invite {
        Some(code) => Some(invites::accept_invite(&state.db, &current, code).await?),
        None => None,
    };

    let games: Vec<GameWithRole> = access::user_games(&state.db, current.id)
        .await?
        .into_iter()
        .map(|g| GameWithRole {
            id: g.game.id,
            name: g.game.name,
            season: g.game.season,
            fine_amount: g.game.fine_amount,
            currency: g.game.currency,
            created_by: g.game.created_by,
            created_at: g.game.created_at.to_rfc3339(),
            updated_at: g.game.updated_at.to_rfc3339(),
            user_role: g.user_role,
        })
        .collect();

    let selected_game_id = accepted
        .as_ref()
        .filter(|o| o.success)
        .and_then(|o| o.game_id);

    // The inbox prompt is skipped on the invite-link path
    let pending_invites = if accepted.is_some() {
        vec![]
    } else {
        load_pending(&state, &current).await?
    };

    Ok(Json(BootstrapResponse {
        games,
        pending_invites,
        accepted_invite: accepted,
        selected_game_id,
    }))
}

async fn load_pending(
    state: &AppState,
    current: &account::Model,
) -> Result<Vec<PendingInvite>, AppError> {
    let pending = invites::pending_for_account(&state.db, current).await?;

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

    Ok(pending
        .into_iter()
        .filter_map(|(invite, maybe_game)| {
            maybe_game.map(|g| PendingInvite {
                id: invite.id,
                game_id: invite.game_id,
                invite_code: invite.invite_code,
                game_name: g.name,
                invited_by_email: inviters.get(&invite.invited_by).cloned(),
                expires_at: invite.expires_at.to_rfc3339(),
            })
        })
        .collect())
}
