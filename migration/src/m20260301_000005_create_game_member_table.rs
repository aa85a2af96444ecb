use sea_orm_migration::prelude::*;

/// Creates the `game_member` table: standing access grants for non-owner
/// accounts. The owner is derived from `game.created_by` and never gets a row
/// here, so the unique (`game_id`, `user_id`) pair is the whole access grant.
#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum GameMember {
    Table,
    Id,
    GameId,
    UserId,
    Role,
    JoinedAt,
}

#[derive(DeriveIden)]
enum Game {
    Table,
    Id,
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
                    .table(GameMember::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GameMember::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(GameMember::GameId).uuid().not_null())
                    .col(ColumnDef::new(GameMember::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(GameMember::Role)
                            .string_len(20)
                            .not_null()
                            .default("member"),
                    )
                    .col(
                        ColumnDef::new(GameMember::JoinedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_game_member_game_id")
                            .from(GameMember::Table, GameMember::GameId)
                            .to(Game::Table, Game::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_game_member_user_id")
                            .from(GameMember::Table, GameMember::UserId)
                            .to(Account::Table, Account::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Backstop against double membership from a racing invite acceptance
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_game_member_game_user")
                    .table(GameMember::Table)
                    .col(GameMember::GameId)
                    .col(GameMember::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_game_member_user_id")
                    .table(GameMember::Table)
                    .col(GameMember::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GameMember::Table).to_owned())
            .await
    }
}
