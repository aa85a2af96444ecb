use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A time-boxed, code-identified offer of membership in a game.
///
/// Stored status is only ever `pending`, `accepted`, or `declined`.
/// Expiry is derived from `expires_at` at read time and never overwrites
/// the stored `pending` value.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "game_invite")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub game_id: Uuid,
    pub invited_email: String,
    pub invited_by: Uuid,
    #[sea_orm(unique)]
    pub invite_code: String,
    pub status: String,
    pub expires_at: DateTimeWithTimeZone,
    pub accepted_by: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::game::Entity",
        from = "Column::GameId",
        to = "super::game::Column::Id",
        on_delete = "Cascade"
    )]
    Game,
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::InvitedBy",
        to = "super::account::Column::Id",
        on_delete = "Cascade"
    )]
    Inviter,
}

impl Related<super::game::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Game.def()
    }
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Inviter.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
