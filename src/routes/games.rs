use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access;
use crate::auth::middleware::{resolve_token, AuthUser};
use crate::auth::password;
use crate::changes::{ChangeAction, ChangeEntity, ChangeEvent};
use crate::entities::{account, event, game, game_invite, game_member, player};
use crate::error::AppError;
use crate::invites;
use crate::state::AppState;
use crate::stats;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Build the game route group: `/games/...`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_game).get(list_games))
        .route(
            "/{id}",
            get(get_game).patch(update_game).delete(delete_game),
        )
        .route("/{id}/reset-season", post(reset_season))
        .route("/{id}/players", post(add_player))
        .route("/{id}/events", post(add_event))
        .route("/{id}/invites", post(create_invite).get(list_invites))
        .route("/{id}/members", get(list_members))
        .route("/{id}/members/{user_id}", axum::routing::delete(remove_member))
        .route("/{id}/leave", post(leave_game))
        .route("/{id}/ws", get(ws_subscribe))
}

// ─────────────────────────────────────────────────────────────────────────────
// DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGameRequest {
    name: String,
    season: Option<String>,
    fine_amount: Option<f64>,
    currency: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateGameRequest {
    name: Option<String>,
    season: Option<String>,
    fine_amount: Option<f64>,
    currency: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddPlayerRequest {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddEventRequest {
    player_id: Uuid,
    reason: Option<String>,
    amount: Option<f64>,
}

#[derive(Deserialize)]
struct CreateInviteRequest {
    email: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GameResponse {
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
struct PlayerResponse {
    id: Uuid,
    game_id: Uuid,
    name: String,
    created_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventResponse {
    id: Uuid,
    game_id: Uuid,
    player_id: Uuid,
    reason: String,
    amount: f64,
    date_iso: String,
    created_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotResponse {
    game: GameResponse,
    players: Vec<PlayerResponse>,
    events: Vec<EventResponse>,
    stats: stats::GameStats,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SeasonResponse {
    season: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InviteResponse {
    id: Uuid,
    game_id: Uuid,
    invited_email: String,
    invited_by: Uuid,
    invited_by_email: Option<String>,
    invite_code: String,
    status: &'static str,
    expires_at: String,
    accepted_by: Option<Uuid>,
    accepted_by_email: Option<String>,
    created_at: String,
    invite_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MemberResponse {
    user_id: Uuid,
    email: Option<String>,
    role: String,
    joined_at: String,
}

#[derive(Deserialize)]
struct WsQueryParams {
    token: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn game_response(g: &game::Model, user_role: &str) -> GameResponse {
    GameResponse {
        id: g.id,
        name: g.name.clone(),
        season: g.season.clone(),
        fine_amount: g.fine_amount,
        currency: g.currency.clone(),
        created_by: g.created_by,
        created_at: g.created_at.to_rfc3339(),
        updated_at: g.updated_at.to_rfc3339(),
        user_role: user_role.to_string(),
    }
}

fn player_response(p: &player::Model) -> PlayerResponse {
    PlayerResponse {
        id: p.id,
        game_id: p.game_id,
        name: p.name.clone(),
        created_at: p.created_at.to_rfc3339(),
    }
}

fn event_response(e: &event::Model) -> EventResponse {
    EventResponse {
        id: e.id,
        game_id: e.game_id,
        player_id: e.player_id,
        reason: e.reason.clone(),
        amount: e.amount,
        date_iso: e.date_iso.to_rfc3339(),
        created_at: e.created_at.to_rfc3339(),
    }
}

fn role_for(g: &game::Model, account_id: Uuid) -> &'static str {
    if g.created_by == account_id {
        access::ROLE_OWNER
    } else {
        access::ROLE_MEMBER
    }
}

fn invite_url(invite: &game_invite::Model, state: &AppState) -> String {
    format!(
        "{}/?invite={}",
        state.config.frontend_url.trim_end_matches('/'),
        invite.invite_code
    )
}

/// Bump a season label: `S3` → `S4`. The season number is the first run of
/// digits in the label; labels without one restart the count at the default,
/// so `Season-X` → `S2`.
fn next_season(season: &str) -> String {
    let digits: String = season
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    let n: i64 = digits.parse().unwrap_or(1);
    format!("S{}", n + 1)
}

/// Load emails for a set of account ids in one query.
async fn emails_by_id(
    state: &AppState,
    ids: Vec<Uuid>,
) -> Result<std::collections::HashMap<Uuid, String>, AppError> {
    if ids.is_empty() {
        return Ok(std::collections::HashMap::new());
    }
    let accounts = account::Entity::find()
        .filter(account::Column::Id.is_in(ids))
        .all(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok(accounts.into_iter().map(|a| (a.id, a.email)).collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Game CRUD
// ─────────────────────────────────────────────────────────────────────────────

/// `POST /api/v1/games` — Create a game; the creator becomes its owner.
async fn create_game(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Json(body): Json<CreateGameRequest>,
) -> Result<(StatusCode, Json<GameResponse>), AppError> {
    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("Game name is required.".to_string()));
    }

    let season = body
        .season
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "S1".to_string());
    let fine_amount = body.fine_amount.unwrap_or(10.0).max(0.0);
    let currency = body
        .currency
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "RM".to_string());

    let now = Utc::now().fixed_offset();
    let new_game = game::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        season: Set(season),
        fine_amount: Set(fine_amount),
        currency: Set(currency),
        created_by: Set(current.id),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let inserted = new_game
        .insert(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    tracing::info!(game_id = %inserted.id, "game created");

    Ok((
        StatusCode::CREATED,
        Json(game_response(&inserted, access::ROLE_OWNER)),
    ))
}

/// `GET /api/v1/games` — The caller's accessible games, newest first.
async fn list_games(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
) -> Result<Json<Vec<GameResponse>>, AppError> {
    let games = access::user_games(&state.db, current.id).await?;

    Ok(Json(
        games
            .iter()
            .map(|g| game_response(&g.game, &g.user_role))
            .collect(),
    ))
}

/// `GET /api/v1/games/{id}` — Full snapshot: game + players + events +
/// derived stats, fetched together so one response carries everything a
/// refresh needs.
async fn get_game(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(game_id): Path<Uuid>,
) -> Result<Json<SnapshotResponse>, AppError> {
    let found = access::require_access(&state.db, game_id, current.id).await?;

    let players = player::Entity::find()
        .filter(player::Column::GameId.eq(game_id))
        .order_by_asc(player::Column::CreatedAt)
        .all(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    let events = event::Entity::find()
        .filter(event::Column::GameId.eq(game_id))
        .order_by_desc(event::Column::DateIso)
        .all(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    let derived = stats::compute(&players, &events, Utc::now().date_naive());

    Ok(Json(SnapshotResponse {
        game: game_response(&found, role_for(&found, current.id)),
        players: players.iter().map(player_response).collect(),
        events: events.iter().map(event_response).collect(),
        stats: derived,
    }))
}

/// `PATCH /api/v1/games/{id}` — Update game settings. Any accessor may edit;
/// historical events keep their recorded amounts.
async fn update_game(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(game_id): Path<Uuid>,
    Json(body): Json<UpdateGameRequest>,
) -> Result<Json<GameResponse>, AppError> {
    let found = access::require_access(&state.db, game_id, current.id).await?;
    let role = role_for(&found, current.id);

    let mut active: game::ActiveModel = found.into();

    if let Some(name) = body.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("Game name is required.".to_string()));
        }
        active.name = Set(name);
    }
    if let Some(season) = body.season {
        let season = season.trim().to_string();
        if season.is_empty() {
            return Err(AppError::BadRequest("Season is required.".to_string()));
        }
        active.season = Set(season);
    }
    if let Some(fine_amount) = body.fine_amount {
        // Negative fines are clamped rather than rejected
        active.fine_amount = Set(fine_amount.max(0.0));
    }
    if let Some(currency) = body.currency {
        let currency = currency.trim().to_uppercase();
        if currency.is_empty() {
            return Err(AppError::BadRequest("Currency is required.".to_string()));
        }
        active.currency = Set(currency);
    }
    active.updated_at = Set(Utc::now().fixed_offset());

    let updated = active
        .update(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    state.changes.publish(&ChangeEvent {
        entity: ChangeEntity::Game,
        action: ChangeAction::Update,
        game_id,
        id: game_id,
    });

    Ok(Json(game_response(&updated, role)))
}

/// `DELETE /api/v1/games/{id}` — Delete a game and everything in it
/// (owner only). Children go first so the explicit ordering holds even
/// without database-level cascades.
async fn delete_game(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(game_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    access::require_owner(&state.db, game_id, current.id).await?;

    let txn = state
        .db
        .begin()
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    game_invite::Entity::delete_many()
        .filter(game_invite::Column::GameId.eq(game_id))
        .exec(&txn)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    game_member::Entity::delete_many()
        .filter(game_member::Column::GameId.eq(game_id))
        .exec(&txn)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    event::Entity::delete_many()
        .filter(event::Column::GameId.eq(game_id))
        .exec(&txn)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    player::Entity::delete_many()
        .filter(player::Column::GameId.eq(game_id))
        .exec(&txn)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    game::Entity::delete_by_id(game_id)
        .exec(&txn)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    txn.commit()
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    state.changes.publish(&ChangeEvent {
        entity: ChangeEntity::Game,
        action: ChangeAction::Delete,
        game_id,
        id: game_id,
    });
    state.changes.remove_game(game_id);

    tracing::info!(game_id = %game_id, "game deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/v1/games/{id}/reset-season` — Clear the event log and bump the
/// season label in one transaction. Players survive the reset.
async fn reset_season(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(game_id): Path<Uuid>,
) -> Result<Json<SeasonResponse>, AppError> {
    let found = access::require_access(&state.db, game_id, current.id).await?;
    let new_season = next_season(&found.season);

    let txn = state
        .db
        .begin()
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    event::Entity::delete_many()
        .filter(event::Column::GameId.eq(game_id))
        .exec(&txn)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    let mut active: game::ActiveModel = found.into();
    active.season = Set(new_season.clone());
    active.updated_at = Set(Utc::now().fixed_offset());
    active
        .update(&txn)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    txn.commit()
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    state.changes.publish(&ChangeEvent {
        entity: ChangeEntity::Event,
        action: ChangeAction::Delete,
        game_id,
        id: game_id,
    });
    state.changes.publish(&ChangeEvent {
        entity: ChangeEntity::Game,
        action: ChangeAction::Update,
        game_id,
        id: game_id,
    });

    tracing::info!(game_id = %game_id, season = %new_season, "season reset");

    Ok(Json(SeasonResponse { season: new_season }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Players & events
// ─────────────────────────────────────────────────────────────────────────────

/// `POST /api/v1/games/{id}/players` — Add a player to the game.
async fn add_player(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(game_id): Path<Uuid>,
    Json(body): Json<AddPlayerRequest>,
) -> Result<(StatusCode, Json<PlayerResponse>), AppError> {
    access::require_access(&state.db, game_id, current.id).await?;

    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("Player name is required.".to_string()));
    }

    let new_player = player::ActiveModel {
        id: Set(Uuid::new_v4()),
        game_id: Set(game_id),
        name: Set(name),
        created_at: Set(Utc::now().fixed_offset()),
    };

    let inserted = new_player
        .insert(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    state.changes.publish(&ChangeEvent {
        entity: ChangeEntity::Player,
        action: ChangeAction::Insert,
        game_id,
        id: inserted.id,
    });

    Ok((StatusCode::CREATED, Json(player_response(&inserted))))
}

/// `POST /api/v1/games/{id}/events` — Record a late event. The amount is a
/// snapshot: it defaults to the game's current fine and stays fixed however
/// the fine changes later.
async fn add_event(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(game_id): Path<Uuid>,
    Json(body): Json<AddEventRequest>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let found = access::require_access(&state.db, game_id, current.id).await?;

    let marked = player::Entity::find_by_id(body.player_id)
        .one(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .ok_or_else(|| AppError::NotFound("Player not found.".to_string()))?;

    if marked.game_id != game_id {
        return Err(AppError::BadRequest(
            "Player does not belong to this game.".to_string(),
        ));
    }

    let reason = body
        .reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "Late".to_string());
    let amount = body.amount.unwrap_or(found.fine_amount).max(0.0);

    let now = Utc::now().fixed_offset();
    let new_event = event::ActiveModel {
        id: Set(Uuid::new_v4()),
        game_id: Set(game_id),
        player_id: Set(marked.id),
        reason: Set(reason),
        amount: Set(amount),
        date_iso: Set(now),
        created_at: Set(now),
    };

    let inserted = new_event
        .insert(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    state.changes.publish(&ChangeEvent {
        entity: ChangeEntity::Event,
        action: ChangeAction::Insert,
        game_id,
        id: inserted.id,
    });

    Ok((StatusCode::CREATED, Json(event_response(&inserted))))
}

// ─────────────────────────────────────────────────────────────────────────────
// Invites (game-scoped)
// ─────────────────────────────────────────────────────────────────────────────

/// `POST /api/v1/games/{id}/invites` — Invite an email to the game
/// (owner only). Repeated invites to one address are allowed and create
/// independent offers.
async fn create_invite(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(game_id): Path<Uuid>,
    Json(body): Json<CreateInviteRequest>,
) -> Result<(StatusCode, Json<InviteResponse>), AppError> {
    let found = access::require_owner(&state.db, game_id, current.id).await?;

    password::validate_email(&body.email).map_err(AppError::BadRequest)?;

    let invite = invites::create_invite(&state.db, &found, &current, &body.email).await?;

    tracing::info!(game_id = %game_id, invite_id = %invite.id, "invite created");

    let url = invite_url(&invite, &state);
    Ok((
        StatusCode::CREATED,
        Json(InviteResponse {
            id: invite.id,
            game_id: invite.game_id,
            invited_email: invite.invited_email.clone(),
            invited_by: invite.invited_by,
            invited_by_email: Some(current.email),
            invite_code: invite.invite_code.clone(),
            status: invites::display_status(&invite, Utc::now()),
            expires_at: invite.expires_at.to_rfc3339(),
            accepted_by: None,
            accepted_by_email: None,
            created_at: invite.created_at.to_rfc3339(),
            invite_url: url,
        }),
    ))
}

/// `GET /api/v1/games/{id}/invites` — Every invite for the game, newest
/// first, with derived display statuses and inviter/acceptor emails.
async fn list_invites(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(game_id): Path<Uuid>,
) -> Result<Json<Vec<InviteResponse>>, AppError> {
    access::require_access(&state.db, game_id, current.id).await?;

    let found = invites::list_for_game(&state.db, game_id).await?;

    let mut ids: Vec<Uuid> = found.iter().map(|i| i.invited_by).collect();
    ids.extend(found.iter().filter_map(|i| i.accepted_by));
    ids.sort_unstable();
    ids.dedup();
    let emails = emails_by_id(&state, ids).await?;

    let now = Utc::now();
    Ok(Json(
        found
            .into_iter()
            .map(|invite| {
                let url = invite_url(&invite, &state);
                InviteResponse {
                    id: invite.id,
                    game_id: invite.game_id,
                    invited_by_email: emails.get(&invite.invited_by).cloned(),
                    accepted_by_email: invite
                        .accepted_by
                        .and_then(|id| emails.get(&id).cloned()),
                    invited_email: invite.invited_email.clone(),
                    invited_by: invite.invited_by,
                    invite_code: invite.invite_code.clone(),
                    status: invites::display_status(&invite, now),
                    expires_at: invite.expires_at.to_rfc3339(),
                    accepted_by: invite.accepted_by,
                    created_at: invite.created_at.to_rfc3339(),
                    invite_url: url,
                }
            })
            .collect(),
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Members
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /api/v1/games/{id}/members` — The owner (derived from `created_by`)
/// followed by member rows in join order.
async fn list_members(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(game_id): Path<Uuid>,
) -> Result<Json<Vec<MemberResponse>>, AppError> {
    let found = access::require_access(&state.db, game_id, current.id).await?;

    let members = game_member::Entity::find()
        .filter(game_member::Column::GameId.eq(game_id))
        .order_by_asc(game_member::Column::JoinedAt)
        .all(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    let mut ids: Vec<Uuid> = members.iter().map(|m| m.user_id).collect();
    ids.push(found.created_by);
    let emails = emails_by_id(&state, ids).await?;

    let mut response = vec![MemberResponse {
        user_id: found.created_by,
        email: emails.get(&found.created_by).cloned(),
        role: access::ROLE_OWNER.to_string(),
        joined_at: found.created_at.to_rfc3339(),
    }];
    response.extend(members.into_iter().map(|m| MemberResponse {
        email: emails.get(&m.user_id).cloned(),
        user_id: m.user_id,
        role: m.role,
        joined_at: m.joined_at.to_rfc3339(),
    }));

    Ok(Json(response))
}

/// `DELETE /api/v1/games/{id}/members/{userId}` — Remove a member
/// (owner only). The owner itself can never be removed through this path.
async fn remove_member(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path((game_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let found = access::require_owner(&state.db, game_id, current.id).await?;

    if user_id == found.created_by {
        return Err(AppError::Conflict(
            "The owner cannot be removed from their own game.".to_string(),
        ));
    }

    let deleted = game_member::Entity::delete_many()
        .filter(game_member::Column::GameId.eq(game_id))
        .filter(game_member::Column::UserId.eq(user_id))
        .exec(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    if deleted.rows_affected == 0 {
        return Err(AppError::NotFound("Member not found.".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/v1/games/{id}/leave` — Give up membership. Owners cannot
/// leave; they delete the game instead.
async fn leave_game(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Path(game_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let found = access::require_access(&state.db, game_id, current.id).await?;

    if found.created_by == current.id {
        return Err(AppError::Conflict(
            "The owner cannot leave their own game.".to_string(),
        ));
    }

    game_member::Entity::delete_many()
        .filter(game_member::Column::GameId.eq(game_id))
        .filter(game_member::Column::UserId.eq(current.id))
        .exec(&state.db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    Ok(StatusCode::NO_CONTENT)
}

// ─────────────────────────────────────────────────────────────────────────────
// Change subscription (WebSocket)
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /api/v1/games/{id}/ws` — Subscribe to the game's change stream.
///
/// Browsers cannot set headers on WebSocket upgrades, so the access token
/// rides in the query string instead.
async fn ws_subscribe(
    State(state): State<AppState>,
    Path(game_id): Path<Uuid>,
    Query(params): Query<WsQueryParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let current = resolve_token(&state, &params.token).await?;
    access::require_access(&state.db, game_id, current.id).await?;

    let ws_state = state.clone();
    Ok(ws.on_upgrade(move |socket| handle_subscription(ws_state, game_id, socket)))
}

/// Own one subscription for the lifetime of one socket. Whatever ends the
/// connection, the hub registration is released before the task returns.
async fn handle_subscription(state: AppState, game_id: Uuid, socket: WebSocket) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    let subscriber_id = Uuid::new_v4();
    state.changes.subscribe(game_id, subscriber_id, tx);

    let subscribed_msg = serde_json::json!({
        "type": "subscribed",
        "payload": { "gameId": game_id }
    });
    let _ = ws_sink
        .send(Message::Text(subscribed_msg.to_string().into()))
        .await;

    // Forward change events to the socket until either side goes away
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sink.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound frames are ignored; the stream only matters for detecting close
    while let Some(Ok(msg)) = ws_stream.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }

    send_task.abort();
    state.changes.unsubscribe(game_id, subscriber_id);
}
