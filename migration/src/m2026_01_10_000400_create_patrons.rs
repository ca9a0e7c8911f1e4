//! Migration to create the patrons table.
//!
//! Patrons are campaign-scoped and upserted on (campaign_id,
//! external_user_id). Rows are never hard-deleted; a departed supporter is
//! transitioned to status 'former' for historical reporting.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Patrons::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Patrons::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Patrons::CampaignId).uuid().not_null())
                    .col(ColumnDef::new(Patrons::ExternalUserId).text().not_null())
                    .col(ColumnDef::new(Patrons::FullName).text().not_null())
                    .col(ColumnDef::new(Patrons::Email).text().null())
                    .col(
                        ColumnDef::new(Patrons::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Patrons::EntitledAmountCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Patrons::LifetimeSupportCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Patrons::Currency)
                            .text()
                            .not_null()
                            .default("USD"),
                    )
                    .col(
                        ColumnDef::new(Patrons::PledgeCapReached)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Patrons::PledgeStart)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Patrons::LastChargeDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Patrons::LastChargeStatus).text().null())
                    .col(
                        ColumnDef::new(Patrons::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Patrons::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_patrons_campaign_id")
                            .from(Patrons::Table, Patrons::CampaignId)
                            .to(Campaigns::Table, Campaigns::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_patrons_campaign_external_user")
                    .table(Patrons::Table)
                    .col(Patrons::CampaignId)
                    .col(Patrons::ExternalUserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_patrons_campaign_status")
                    .table(Patrons::Table)
                    .col(Patrons::CampaignId)
                    .col(Patrons::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_patrons_campaign_external_user")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_patrons_campaign_status").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Patrons::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Patrons {
    Table,
    Id,
    CampaignId,
    ExternalUserId,
    FullName,
    Email,
    Status,
    EntitledAmountCents,
    LifetimeSupportCents,
    Currency,
    PledgeCapReached,
    PledgeStart,
    LastChargeDate,
    LastChargeStatus,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Campaigns {
    Table,
    Id,
}
