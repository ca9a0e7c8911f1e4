//! Campaign repository
//!
//! Campaign rows are imported on OAuth callback and refreshed by sync runs.
//! The patron_count / pledge_sum_cents columns are derived caches recomputed
//! from persisted patron rows after each run.

use anyhow::Result;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, JoinType, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::campaign::{self, Entity as Campaign};
use crate::models::connected_account;

/// Repository for campaign database operations
#[derive(Debug, Clone)]
pub struct CampaignRepository {
    pub db: Arc<DatabaseConnection>,
}

impl CampaignRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Idempotent upsert on (account_id, external_campaign_id). A re-import
    /// refreshes name/currency/activity but never clobbers derived caches,
    /// the webhook secret, or sync bookkeeping.
    pub async fn upsert(&self, model: campaign::ActiveModel) -> Result<campaign::Model> {
        let result = Campaign::insert(model)
            .on_conflict(
                OnConflict::columns([
                    campaign::Column::AccountId,
                    campaign::Column::ExternalCampaignId,
                ])
                .update_columns([
                    campaign::Column::Name,
                    campaign::Column::Currency,
                    campaign::Column::IsActive,
                    campaign::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_with_returning(self.db.as_ref())
            .await?;
        Ok(result)
    }

    /// Fetch a campaign by primary key.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<campaign::Model>> {
        Ok(Campaign::find_by_id(id).one(self.db.as_ref()).await?)
    }

    /// Fetch a campaign only if it belongs to one of the user's accounts.
    pub async fn get_owned(&self, user_id: Uuid, id: Uuid) -> Result<Option<campaign::Model>> {
        Ok(Campaign::find_by_id(id)
            .join(
                JoinType::InnerJoin,
                campaign::Relation::ConnectedAccount.def(),
            )
            .filter(connected_account::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await?)
    }

    /// Resolve a campaign by its Patreon id (webhook routing; unauthenticated).
    pub async fn get_by_external_id(
        &self,
        external_campaign_id: &str,
    ) -> Result<Option<campaign::Model>> {
        Ok(Campaign::find()
            .filter(campaign::Column::ExternalCampaignId.eq(external_campaign_id))
            .one(self.db.as_ref())
            .await?)
    }

    /// All campaigns under the given account.
    pub async fn list_for_account(&self, account_id: Uuid) -> Result<Vec<campaign::Model>> {
        Ok(Campaign::find()
            .filter(campaign::Column::AccountId.eq(account_id))
            .order_by_asc(campaign::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    /// All campaigns reachable through the user's connected accounts.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<campaign::Model>> {
        Ok(Campaign::find()
            .join(
                JoinType::InnerJoin,
                campaign::Relation::ConnectedAccount.def(),
            )
            .filter(connected_account::Column::UserId.eq(user_id))
            .order_by_asc(campaign::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    /// Overwrite the derived aggregate caches.
    pub async fn update_aggregates(
        &self,
        campaign_id: Uuid,
        patron_count: i32,
        pledge_sum_cents: i64,
    ) -> Result<()> {
        let active = campaign::ActiveModel {
            id: Set(campaign_id),
            patron_count: Set(patron_count),
            pledge_sum_cents: Set(pledge_sum_cents),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };
        active.update(self.db.as_ref()).await?;
        Ok(())
    }

    /// Stamp a completed sync.
    pub async fn mark_synced(&self, campaign_id: Uuid) -> Result<()> {
        let now = Utc::now();
        let active = campaign::ActiveModel {
            id: Set(campaign_id),
            last_synced_at: Set(Some(now.into())),
            updated_at: Set(now.into()),
            ..Default::default()
        };
        active.update(self.db.as_ref()).await?;
        Ok(())
    }

    /// Set or rotate the per-campaign webhook secret.
    pub async fn set_webhook_secret(&self, campaign_id: Uuid, secret: &str) -> Result<()> {
        let active = campaign::ActiveModel {
            id: Set(campaign_id),
            webhook_secret: Set(Some(secret.to_string())),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };
        active.update(self.db.as_ref()).await?;
        Ok(())
    }
}
