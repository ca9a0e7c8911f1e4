//! Migration to create the connected_accounts table.
//!
//! A connected account is one Patreon identity linked to one dashboard user,
//! with its encrypted OAuth credential pair and expiry.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ConnectedAccounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ConnectedAccounts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ConnectedAccounts::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(ConnectedAccounts::ExternalUserId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConnectedAccounts::DisplayName)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConnectedAccounts::AccessTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ConnectedAccounts::RefreshTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ConnectedAccounts::TokenExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ConnectedAccounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ConnectedAccounts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_connected_accounts_user_id")
                            .from(ConnectedAccounts::Table, ConnectedAccounts::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_connected_accounts_user_external")
                    .table(ConnectedAccounts::Table)
                    .col(ConnectedAccounts::UserId)
                    .col(ConnectedAccounts::ExternalUserId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_connected_accounts_user_external")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ConnectedAccounts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ConnectedAccounts {
    Table,
    Id,
    UserId,
    ExternalUserId,
    DisplayName,
    AccessTokenCiphertext,
    RefreshTokenCiphertext,
    TokenExpiresAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
