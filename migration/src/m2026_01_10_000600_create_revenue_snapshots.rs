//! Migration to create the revenue_snapshots table.
//!
//! One row per (campaign, date). patron_ids captures the active patron id
//! set at snapshot time so the next sync can diff new/lost patrons.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RevenueSnapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RevenueSnapshots::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RevenueSnapshots::CampaignId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RevenueSnapshots::Date).date().not_null())
                    .col(
                        ColumnDef::new(RevenueSnapshots::PatronCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RevenueSnapshots::PledgeSumCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RevenueSnapshots::NewPatrons)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RevenueSnapshots::LostPatrons)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RevenueSnapshots::PatronIds)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RevenueSnapshots::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(RevenueSnapshots::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_revenue_snapshots_campaign_id")
                            .from(RevenueSnapshots::Table, RevenueSnapshots::CampaignId)
                            .to(Campaigns::Table, Campaigns::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_revenue_snapshots_campaign_date")
                    .table(RevenueSnapshots::Table)
                    .col(RevenueSnapshots::CampaignId)
                    .col(RevenueSnapshots::Date)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_revenue_snapshots_campaign_date")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(RevenueSnapshots::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RevenueSnapshots {
    Table,
    Id,
    CampaignId,
    Date,
    PatronCount,
    PledgeSumCents,
    NewPatrons,
    LostPatrons,
    PatronIds,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Campaigns {
    Table,
    Id,
}
