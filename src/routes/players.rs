use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::delete;
use axum::Router;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, TransactionTrait};
use uuid::Uuid;

use crate::access;
use crate::auth::middleware::AuthUser;
use crate::changes::{ChangeAction, ChangeEntity, ChangeEvent};
use crate::entities::{event, player};
use crate::error::AppError;
use crate::state::AppState;

/// Build the player route group: `/players/...`
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", delete(delete_player))
}

/// `DELETE /api/v1/players/{id}` — Remove a player and all their events.
///
/// Events go first; the event→player foreign key is RESTRICT, so the
/// ordering is enforced rather than delegated to a database cascade.
async fn delete_player(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(player_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let found = player::Entity::find_by_id(player_id)
        .one(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .ok_or_else(|| AppError::NotFound("Player not found.".to_string()))?;

    let game_id = found.game_id;
    access::require_access(&state.db, game_id, current.id).await?;

    let txn = state
        .db
        .begin()
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    event::Entity::delete_many()
        .filter(event::Column::PlayerId.eq(player_id))
        .exec(&txn)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    player::Entity::delete_by_id(player_id)
        .exec(&txn)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    txn.commit()
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    state.changes.publish(&ChangeEvent {
        entity: ChangeEntity::Event,
        action: ChangeAction::Delete,
        game_id,
        id: player_id,
    });
    state.changes.publish(&ChangeEvent {
        entity: ChangeEntity::Player,
        action: ChangeAction::Delete,
        game_id,
        id: player_id,
    });

    Ok(StatusCode::NO_CONTENT)
}
