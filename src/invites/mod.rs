//! Invitation lifecycle: create, list, accept, decline, cancel.
//!
//! Stored invite status is one of `pending`, `accepted`, `declined`.
//! Expiry is derived at read time ([`display_status`]) and never written
//! back. Acceptance runs inside a single transaction so that of two racing
//! accepts of the same code, exactly one succeeds and the other observes the
//! already-accepted state as a structured failure.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sea_orm::sea_query::Expr;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Serialize;
use uuid::Uuid;

use crate::access;
use crate::entities::{account, game, game_invite, game_member};
use crate::error::AppError;

/// Fixed invite lifetime. The expiry window is stamped at creation and
/// never extended.
pub const INVITE_TTL_DAYS: i64 = 7;

/// Sentinel address for shareable link invites: acceptance matches by code
/// only, so the email on these is cosmetic.
pub const LINK_INVITE_EMAIL: &str = "anonymous@invite.link";

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_ACCEPTED: &str = "accepted";
pub const STATUS_DECLINED: &str = "declined";

/// Alphanumeric alphabet for invite codes. Codes ride in links, so there is
/// no need to avoid visually ambiguous characters.
const INVITE_CODE_CHARS: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const INVITE_CODE_LENGTH: usize = 32;

/// Maximum attempts to generate a code that is not already taken.
const MAX_CODE_GENERATION_ATTEMPTS: u32 = 10;

/// Result of an acceptance attempt. A lost race, an expired code, or an
/// already-consumed invite are expected outcomes and come back as
/// `success: false` with a message, not as an error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptOutcome {
    pub success: bool,
    pub message: String,
    pub game_id: Option<Uuid>,
}

impl AcceptOutcome {
    fn failure(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            game_id: None,
        }
    }
}

/// Trim and lower-case an email for storage and matching.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Derived display status for an invite: the stored status, with `pending`
/// turning into `expired` once `expires_at` has passed.
#[must_use]
pub fn display_status(invite: &game_invite::Model, now: DateTime<Utc>) -> &'static str {
    match invite.status.as_str() {
        STATUS_ACCEPTED => "accepted",
        STATUS_DECLINED => "declined",
        _ if invite.expires_at < now => "expired",
        _ => "pending",
    }
}

fn random_invite_code() -> String {
    let mut rng = rand::thread_rng();
    (0..INVITE_CODE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..INVITE_CODE_CHARS.len());
            char::from(INVITE_CODE_CHARS[idx])
        })
        .collect()
}

/// Generate an invite code that does not collide with an existing one.
///
/// # Errors
///
/// Returns an error if a unique code cannot be found after
/// [`MAX_CODE_GENERATION_ATTEMPTS`] tries, or if a lookup fails.
async fn generate_invite_code(db: &DatabaseConnection) -> Result<String, AppError> {
    for _ in 0..MAX_CODE_GENERATION_ATTEMPTS {
        let code = random_invite_code();

        let existing = game_invite::Entity::find()
            .filter(game_invite::Column::InviteCode.eq(&code))
            .one(db)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;

        if existing.is_none() {
            return Ok(code);
        }
    }

    Err(AppError::Internal(anyhow::anyhow!(
        "Failed to generate unique invite code after {MAX_CODE_GENERATION_ATTEMPTS} attempts"
    )))
}

/// Create an invite for a game. The caller must already be verified as the
/// game's owner. Duplicate invites for the same email are allowed: sending
/// twice produces two pending rows, each with its own code and expiry.
///
/// # Errors
///
/// Returns an error if code generation or the insert fails.
pub async fn create_invite(
    db: &DatabaseConnection,
    game: &game::Model,
    inviter: &account::Model,
    email: &str,
) -> Result<game_invite::Model, AppError> {
    let code = generate_invite_code(db).await?;
    let now = Utc::now();

    let invite = game_invite::ActiveModel {
        id: Set(Uuid::new_v4()),
        game_id: Set(game.id),
        invited_email: Set(normalize_email(email)),
        invited_by: Set(inviter.id),
        invite_code: Set(code),
        status: Set(STATUS_PENDING.to_string()),
        expires_at: Set((now + Duration::days(INVITE_TTL_DAYS)).fixed_offset()),
        accepted_by: Set(None),
        created_at: Set(now.fixed_offset()),
    };

    invite
        .insert(db)
        .await
        .map_err(|e| AppError::Internal(e.into()))
}

/// All invites ever sent for a game, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub async fn list_for_game(
    db: &DatabaseConnection,
    game_id: Uuid,
) -> Result<Vec<game_invite::Model>, AppError> {
    game_invite::Entity::find()
        .filter(game_invite::Column::GameId.eq(game_id))
        .order_by_desc(game_invite::Column::CreatedAt)
        .all(db)
        .await
        .map_err(|e| AppError::Internal(e.into()))
}

/// The account's inbox of open offers: pending, unexpired invites addressed
/// to its email, each paired with the game it offers.
///
/// # Errors
///
/// Returns an error if the query fails.
pub async fn pending_for_account(
    db: &DatabaseConnection,
    account: &account::Model,
) -> Result<Vec<(game_invite::Model, Option<game::Model>)>, AppError> {
    game_invite::Entity::find()
        .filter(game_invite::Column::InvitedEmail.eq(normalize_email(&account.email)))
        .filter(game_invite::Column::Status.eq(STATUS_PENDING))
        .filter(game_invite::Column::ExpiresAt.gt(Utc::now()))
        .find_also_related(game::Entity)
        .all(db)
        .await
        .map_err(|e| AppError::Internal(e.into()))
}

/// Accept an invite by code, atomically.
///
/// One transaction covers lookup, terminal/expiry checks, the status flip,
/// and membership creation. The flip is a guarded update (`status` must
/// still be `pending`), so of two racing accepts only one claims the row;
/// the loser sees zero rows affected and reports the invite as consumed.
/// The accepting identity is whoever presents the code — link invites rely
/// on this.
///
/// # Errors
///
/// Returns an error only on storage failure; every expected rejection is an
/// `AcceptOutcome` with `success: false`.
pub async fn accept_invite(
    db: &DatabaseConnection,
    account: &account::Model,
    code: &str,
) -> Result<AcceptOutcome, AppError> {
    let txn = db.begin().await.map_err(|e| AppError::Internal(e.into()))?;

    let outcome = accept_in_txn(&txn, account, code).await?;

    if outcome.success {
        txn.commit().await.map_err(|e| AppError::Internal(e.into()))?;
    } else {
        txn.rollback()
            .await
            .map_err(|e| AppError::Internal(e.into()))?;
    }

    Ok(outcome)
}

async fn accept_in_txn(
    txn: &DatabaseTransaction,
    account: &account::Model,
    code: &str,
) -> Result<AcceptOutcome, AppError> {
    let now = Utc::now();

    let Some(invite) = game_invite::Entity::find()
        .filter(game_invite::Column::InviteCode.eq(code))
        .one(txn)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
    else {
        return Ok(AcceptOutcome::failure("Invite not found."));
    };

    match invite.status.as_str() {
        STATUS_ACCEPTED => {
            return Ok(AcceptOutcome::failure(
                "This invite has already been accepted.",
            ));
        }
        STATUS_DECLINED => {
            return Ok(AcceptOutcome::failure("This invite has been declined."));
        }
        _ => {}
    }

    if invite.expires_at < now {
        return Ok(AcceptOutcome::failure("This invite has expired."));
    }

    let Some(invited_game) = game::Entity::find_by_id(invite.game_id)
        .one(txn)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
    else {
        return Ok(AcceptOutcome::failure("This game no longer exists."));
    };

    // Claim the invite first: the guarded update succeeds for exactly one
    // of any set of racing accepts, and the losers stop here.
    let claimed = game_invite::Entity::update_many()
        .col_expr(game_invite::Column::Status, Expr::value(STATUS_ACCEPTED))
        .col_expr(game_invite::Column::AcceptedBy, Expr::value(account.id))
        .filter(game_invite::Column::Id.eq(invite.id))
        .filter(game_invite::Column::Status.eq(STATUS_PENDING))
        .exec(txn)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    if claimed.rows_affected == 0 {
        return Ok(AcceptOutcome::failure(
            "This invite has already been accepted.",
        ));
    }

    // The owner accepting their own invite must not grow a member row.
    if invited_game.created_by != account.id {
        let existing = game_member::Entity::find()
            .filter(game_member::Column::GameId.eq(invite.game_id))
            .filter(game_member::Column::UserId.eq(account.id))
            .one(txn)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;

        if existing.is_none() {
            let member = game_member::ActiveModel {
                id: Set(Uuid::new_v4()),
                game_id: Set(invite.game_id),
                user_id: Set(account.id),
                role: Set(access::ROLE_MEMBER.to_string()),
                joined_at: Set(now.fixed_offset()),
            };
            member
                .insert(txn)
                .await
                .map_err(|e| AppError::Internal(e.into()))?;
        }
    }

    Ok(AcceptOutcome {
        success: true,
        message: "Invite accepted.".to_string(),
        game_id: Some(invite.game_id),
    })
}

/// Decline an invite. Only the invited account (matched by email) may
/// decline, and a terminal invite is left untouched.
///
/// # Errors
///
/// `AppError::NotFound` if the invite id is unknown, `AppError::Forbidden`
/// if the caller is not the addressee, or an internal error on storage
/// failure.
pub async fn decline_invite(
    db: &DatabaseConnection,
    account: &account::Model,
    invite_id: Uuid,
) -> Result<(), AppError> {
    let invite = game_invite::Entity::find_by_id(invite_id)
        .one(db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .ok_or_else(|| AppError::NotFound("Invite not found.".to_string()))?;

    if invite.invited_email != normalize_email(&account.email) {
        return Err(AppError::Forbidden(
            "Only the invited account can decline this invite.".to_string(),
        ));
    }

    // Never un-terminate: declining an accepted/declined invite is a no-op.
    if invite.status != STATUS_PENDING {
        return Ok(());
    }

    let mut active: game_invite::ActiveModel = invite.into();
    active.status = Set(STATUS_DECLINED.to_string());
    active
        .update(db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok(())
}

/// Cancel (hard-delete) a pending invite. Owner action: removes the offer
/// outright, unlike decline which records the recipient's rejection.
///
/// # Errors
///
/// `AppError::NotFound` for an unknown id, `AppError::Forbidden` when the
/// caller does not own the game, `AppError::Conflict` when the invite is no
/// longer pending, or an internal error on storage failure.
pub async fn cancel_invite(
    db: &DatabaseConnection,
    account: &account::Model,
    invite_id: Uuid,
) -> Result<(), AppError> {
    let invite = game_invite::Entity::find_by_id(invite_id)
        .one(db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .ok_or_else(|| AppError::NotFound("Invite not found.".to_string()))?;

    access::require_owner(db, invite.game_id, account.id).await?;

    if invite.status != STATUS_PENDING {
        return Err(AppError::Conflict(
            "Only pending invites can be cancelled.".to_string(),
        ));
    }

    game_invite::Entity::delete_by_id(invite.id)
        .exec(db)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok(())
}
