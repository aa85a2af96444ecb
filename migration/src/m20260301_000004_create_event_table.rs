use sea_orm_migration::prelude::*;

/// Creates the `event` table: one row per recorded late occurrence.
///
/// The player foreign key is RESTRICT on purpose: deleting a player must
/// delete its events first, in application code, so the ordering is explicit.
#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Event {
    Table,
    Id,
    GameId,
    PlayerId,
    Reason,
    Amount,
    DateIso,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Game {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Player {
    Table,
    Id,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Event::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Event::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Event::GameId).uuid().not_null())
                    .col(ColumnDef::new(Event::PlayerId).uuid().not_null())
                    .col(
                        ColumnDef::new(Event::Reason)
                            .string_len(500)
                            .not_null()
                            .default("Late"),
                    )
                    .col(ColumnDef::new(Event::Amount).double().not_null())
                    .col(
                        ColumnDef::new(Event::DateIso)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Event::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_game_id")
                            .from(Event::Table, Event::GameId)
                            .to(Game::Table, Game::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_player_id")
                            .from(Event::Table, Event::PlayerId)
                            .to(Player::Table, Player::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_event_game_id")
                    .table(Event::Table)
                    .col(Event::GameId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_event_player_id")
                    .table(Event::Table)
                    .col(Event::PlayerId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Event::Table).to_owned())
            .await
    }
}
