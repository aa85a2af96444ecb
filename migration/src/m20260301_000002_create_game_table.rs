use sea_orm_migration::prelude::*;

/// Creates the `game` table, one row per tracked fine season/group.
#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Game {
    Table,
    Id,
    Name,
    Season,
    FineAmount,
    Currency,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Account {
    Table,
    Id,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Game::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Game::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Game::Name).string_len(200).not_null())
                    .col(
                        ColumnDef::new(Game::Season)
                            .string_len(50)
                            .not_null()
                            .default("S1"),
                    )
                    .col(
                        ColumnDef::new(Game::FineAmount)
                            .double()
                            .not_null()
                            .default(10.0),
                    )
                    .col(
                        ColumnDef::new(Game::Currency)
                            .string_len(10)
                            .not_null()
                            .default("RM"),
                    )
                    .col(ColumnDef::new(Game::CreatedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(Game::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Game::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_game_created_by")
                            .from(Game::Table, Game::CreatedBy)
                            .to(Account::Table, Account::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index for the owned-games half of the accessible-games query
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_game_created_by")
                    .table(Game::Table)
                    .col(Game::CreatedBy)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Game::Table).to_owned())
            .await
    }
}
