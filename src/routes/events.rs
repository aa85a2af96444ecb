use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::delete;
use axum::Router;
use sea_orm::EntityTrait;
use uuid::Uuid;

use crate::access;
use crate::auth::middleware::AuthUser;
use crate::changes::{ChangeAction, ChangeEntity, ChangeEvent};
use crate::entities::event;
use crate::error::AppError;
use crate::state::AppState;

/// Build the event route group: `/events/...`
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", delete(delete_event))
}

/// `DELETE /api/v1/events/{id}` — Remove one recorded event. The only
/// mutation events support besides insertion.
async fn delete_event(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(event_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let found = event::Entity::find_by_id(event_id)
        .one(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .ok_or_else(|| AppError::NotFound("Event not found.".to_string()))?;

    let game_id = found.game_id;
    access::require_access(&state.db, game_id, current.id).await?;

    event::Entity::delete_by_id(event_id)
        .exec(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    state.changes.publish(&ChangeEvent {
        entity: ChangeEntity::Event,
        action: ChangeAction::Delete,
        game_id,
        id: event_id,
    });

    Ok(StatusCode::NO_CONTENT)
}
