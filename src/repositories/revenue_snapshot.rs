//! Revenue snapshot repository
//!
//! Dated aggregate rows keyed on (campaign_id, date). Re-running a sync
//! on the same day overwrites that day's snapshot in place.

use anyhow::Result;
use chrono::NaiveDate;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, JoinType, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::revenue_snapshot::{self, Entity as RevenueSnapshot};
use crate::models::{campaign, connected_account};

/// Repository for revenue snapshot database operations
#[derive(Debug, Clone)]
pub struct RevenueSnapshotRepository {
    pub db: Arc<DatabaseConnection>,
}

impl RevenueSnapshotRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Idempotent upsert on (campaign_id, date); the latest figures for the
    /// day win.
    pub async fn upsert(
        &self,
        model: revenue_snapshot::ActiveModel,
    ) -> Result<revenue_snapshot::Model> {
        let result = RevenueSnapshot::insert(model)
            .on_conflict(
                OnConflict::columns([
                    revenue_snapshot::Column::CampaignId,
                    revenue_snapshot::Column::Date,
                ])
                .update_columns([
                    revenue_snapshot::Column::PatronCount,
                    revenue_snapshot::Column::PledgeSumCents,
                    revenue_snapshot::Column::NewPatrons,
                    revenue_snapshot::Column::LostPatrons,
                    revenue_snapshot::Column::PatronIds,
                    revenue_snapshot::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_with_returning(self.db.as_ref())
            .await?;
        Ok(result)
    }

    /// Most recent snapshot strictly before `date`, used to diff the
    /// new/lost patron sets.
    pub async fn latest_before(
        &self,
        campaign_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<revenue_snapshot::Model>> {
        Ok(RevenueSnapshot::find()
            .filter(revenue_snapshot::Column::CampaignId.eq(campaign_id))
            .filter(revenue_snapshot::Column::Date.lt(date))
            .order_by_desc(revenue_snapshot::Column::Date)
            .one(self.db.as_ref())
            .await?)
    }

    /// Snapshots across the user's campaigns whose date falls inside
    /// [from, to], newest first. The dashboard reduces these to one prior
    /// figure per campaign.
    pub async fn latest_in_window(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<revenue_snapshot::Model>> {
        Ok(Self::scoped(user_id, None)
            .filter(revenue_snapshot::Column::Date.gte(from))
            .filter(revenue_snapshot::Column::Date.lte(to))
            .order_by_desc(revenue_snapshot::Column::Date)
            .all(self.db.as_ref())
            .await?)
    }

    /// Snapshot rows in [from, to] across the user's campaigns, oldest
    /// first, optionally narrowed to one campaign.
    pub async fn series(
        &self,
        user_id: Uuid,
        campaign_id: Option<Uuid>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<revenue_snapshot::Model>> {
        Ok(Self::scoped(user_id, campaign_id)
            .filter(revenue_snapshot::Column::Date.gte(from))
            .filter(revenue_snapshot::Column::Date.lte(to))
            .order_by_asc(revenue_snapshot::Column::Date)
            .order_by_asc(revenue_snapshot::Column::CampaignId)
            .all(self.db.as_ref())
            .await?)
    }

    fn scoped(user_id: Uuid, campaign_id: Option<Uuid>) -> sea_orm::Select<RevenueSnapshot> {
        let mut select = RevenueSnapshot::find()
            .join(JoinType::InnerJoin, revenue_snapshot::Relation::Campaign.def())
            .join(
                JoinType::InnerJoin,
                campaign::Relation::ConnectedAccount.def(),
            )
            .filter(connected_account::Column::UserId.eq(user_id));

        if let Some(campaign_id) = campaign_id {
            select = select.filter(revenue_snapshot::Column::CampaignId.eq(campaign_id));
        }

        select
    }
}
