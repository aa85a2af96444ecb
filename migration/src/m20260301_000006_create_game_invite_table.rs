use sea_orm_migration::prelude::*;

/// Creates the `game_invite` table: time-boxed, code-identified membership
/// offers. "Expired" is derived from `expires_at` at read time, never stored.
#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum GameInvite {
    Table,
    Id,
    GameId,
    InvitedEmail,
    InvitedBy,
    InviteCode,
    Status,
    ExpiresAt,
    AcceptedBy,
    CreatedAt,
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
                    .table(GameInvite::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GameInvite::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(GameInvite::GameId).uuid().not_null())
                    .col(
                        ColumnDef::new(GameInvite::InvitedEmail)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(GameInvite::InvitedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(GameInvite::InviteCode)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(GameInvite::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(GameInvite::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(GameInvite::AcceptedBy).uuid().null())
                    .col(
                        ColumnDef::new(GameInvite::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_game_invite_game_id")
                            .from(GameInvite::Table, GameInvite::GameId)
                            .to(Game::Table, Game::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_game_invite_invited_by")
                            .from(GameInvite::Table, GameInvite::InvitedBy)
                            .to(Account::Table, Account::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_game_invite_game_id")
                    .table(GameInvite::Table)
                    .col(GameInvite::GameId)
                    .to_owned(),
            )
            .await?;

        // Inbox lookups filter by invited email + status
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_game_invite_email_status")
                    .table(GameInvite::Table)
                    .col(GameInvite::InvitedEmail)
                    .col(GameInvite::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GameInvite::Table).to_owned())
            .await
    }
}
