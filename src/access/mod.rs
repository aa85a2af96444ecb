//! Game access control.
//!
//! An account can see a game when it owns it (`game.created_by`) or holds a
//! `game_member` row. Ownership is derived solely from `created_by`; member
//! rows never represent the owner. Checks run as a single query so there is
//! no window between "look up game" and "check membership" in which a
//! revocation could slip through.

use sea_orm::sea_query::Query;
use sea_orm::{ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::entities::{game, game_member};
use crate::error::AppError;

/// Opaque denial shared by "no such game" and "no access": callers must not
/// be able to tell whether a game id exists from the error alone.
pub const ACCESS_DENIED: &str = "You do not have access to this game.";

/// Role labels surfaced on accessible games.
pub const ROLE_OWNER: &str = "owner";
pub const ROLE_MEMBER: &str = "member";

/// A game the account can see, tagged with the account's role in it.
#[derive(Debug, Clone)]
pub struct AccessibleGame {
    pub game: game::Model,
    pub user_role: String,
}

/// Find a game only if the account may access it, in one round trip:
/// `WHERE id = ? AND (created_by = ? OR id IN (member games of ?))`.
///
/// # Errors
///
/// Returns an error if the underlying query fails.
async fn find_accessible(
    db: &DatabaseConnection,
    game_id: Uuid,
    account_id: Uuid,
) -> Result<Option<game::Model>, AppError> {
    game::Entity::find_by_id(game_id)
        .filter(
            Condition::any()
                .add(game::Column::CreatedBy.eq(account_id))
                .add(
                    game::Column::Id.in_subquery(
                        Query::select()
                            .column(game_member::Column::GameId)
                            .from(game_member::Entity)
                            .and_where(game_member::Column::UserId.eq(account_id))
                            .to_owned(),
                    ),
                ),
        )
        .one(db)
        .await
        .map_err(|e| AppError::Internal(e.into()))
}

/// Check whether an account may read/write a game.
///
/// # Errors
///
/// Returns an error if the underlying query fails.
pub async fn has_game_access(
    db: &DatabaseConnection,
    game_id: Uuid,
    account_id: Uuid,
) -> Result<bool, AppError> {
    Ok(find_accessible(db, game_id, account_id).await?.is_some())
}

/// Load a game the account may access, or fail with the opaque denial.
///
/// # Errors
///
/// `AppError::Forbidden` when the game is missing or the account lacks
/// access; an internal error if the query fails.
pub async fn require_access(
    db: &DatabaseConnection,
    game_id: Uuid,
    account_id: Uuid,
) -> Result<game::Model, AppError> {
    find_accessible(db, game_id, account_id)
        .await?
        .ok_or_else(|| AppError::Forbidden(ACCESS_DENIED.to_string()))
}

/// Load a game only if the account owns it. Same opaque denial as
/// [`require_access`] so non-owners learn nothing extra.
///
/// # Errors
///
/// `AppError::Forbidden` when the game is missing or the account is not the
/// owner; an internal error if the query fails.
pub async fn require_owner(
    db: &DatabaseConnection,
    game_id: Uuid,
    account_id: Uuid,
) -> Result<game::Model, AppError> {
    game::Entity::find_by_id(game_id)
        .filter(game::Column::CreatedBy.eq(account_id))
        .one(db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .ok_or_else(|| AppError::Forbidden(ACCESS_DENIED.to_string()))
}

/// All games an account can see: owned ∪ member, deduplicated by game id,
/// newest first. Owned games win the dedup (an owner never has a member row,
/// so in practice the union is disjoint).
///
/// # Errors
///
/// Returns an error if an underlying query fails.
pub async fn user_games(
    db: &DatabaseConnection,
    account_id: Uuid,
) -> Result<Vec<AccessibleGame>, AppError> {
    let owned = game::Entity::find()
        .filter(game::Column::CreatedBy.eq(account_id))
        .all(db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    let memberships = game_member::Entity::find()
        .filter(game_member::Column::UserId.eq(account_id))
        .find_also_related(game::Entity)
        .all(db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    let mut by_id: std::collections::HashMap<Uuid, AccessibleGame> = owned
        .into_iter()
        .map(|g| {
            (
                g.id,
                AccessibleGame {
                    game: g,
                    user_role: ROLE_OWNER.to_string(),
                },
            )
        })
        .collect();

    for (member, maybe_game) in memberships {
        if let Some(g) = maybe_game {
            by_id.entry(g.id).or_insert_with(|| AccessibleGame {
                game: g,
                user_role: member.role,
            });
        }
    }

    let mut games: Vec<AccessibleGame> = by_id.into_values().collect();
    games.sort_by(|a, b| b.game.created_at.cmp(&a.game.created_at));
    Ok(games)
}
