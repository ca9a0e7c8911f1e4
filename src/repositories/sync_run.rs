//! Sync run repository
//!
//! The in_progress transition is guarded by a partial unique index on
//! sync_runs(campaign_id) WHERE status = 'in_progress', so a second run
//! racing for the same campaign loses at the database even when it slips
//! past the in-memory guard.

use anyhow::Result;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, JoinType, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::sync_run::{
    self, Entity as SyncRun, STATUS_COMPLETED, STATUS_FAILED, STATUS_IN_PROGRESS, STATUS_PENDING,
};
use crate::models::{campaign, connected_account};

/// Outcome of attempting to move a run into in_progress.
#[derive(Debug)]
pub enum ClaimOutcome {
    Claimed(sync_run::Model),
    /// Another run already holds the campaign's in_progress slot.
    AlreadyRunning,
}

/// Repository for sync run database operations
#[derive(Debug, Clone)]
pub struct SyncRunRepository {
    pub db: Arc<DatabaseConnection>,
}

impl SyncRunRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Record a freshly triggered run in the pending state.
    pub async fn create_pending(&self, campaign_id: Uuid) -> Result<sync_run::Model> {
        let now = Utc::now();
        let model = sync_run::ActiveModel {
            id: Set(Uuid::new_v4()),
            campaign_id: Set(campaign_id),
            status: Set(STATUS_PENDING.to_string()),
            progress: Set(0),
            total_items: Set(0),
            processed_items: Set(0),
            error_message: Set(None),
            started_at: Set(None),
            completed_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        Ok(model.insert(self.db.as_ref()).await?)
    }

    /// Try to move a pending run into in_progress, stamping started_at.
    /// A unique violation on the partial index means another run already
    /// holds the campaign.
    pub async fn mark_in_progress(&self, run_id: Uuid) -> Result<ClaimOutcome> {
        let run = self.get(run_id).await?;
        let Some(run) = run else {
            anyhow::bail!("sync run {run_id} not found");
        };

        let now = Utc::now();
        let mut active: sync_run::ActiveModel = run.into();
        active.status = Set(STATUS_IN_PROGRESS.to_string());
        active.started_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());

        match active.update(self.db.as_ref()).await {
            Ok(updated) => Ok(ClaimOutcome::Claimed(updated)),
            Err(error) if is_unique_violation(&error) => Ok(ClaimOutcome::AlreadyRunning),
            Err(error) => Err(error.into()),
        }
    }

    /// Whether the campaign currently has an in_progress run.
    pub async fn has_in_progress(&self, campaign_id: Uuid) -> Result<bool> {
        let count = SyncRun::find()
            .filter(sync_run::Column::CampaignId.eq(campaign_id))
            .filter(sync_run::Column::Status.eq(STATUS_IN_PROGRESS))
            .count(self.db.as_ref())
            .await?;
        Ok(count > 0)
    }

    /// Advance progress and item counters. Progress never moves backwards;
    /// a lower value than the stored one is kept as-is.
    pub async fn update_progress(
        &self,
        run_id: Uuid,
        progress: i32,
        total_items: i32,
        processed_items: i32,
    ) -> Result<()> {
        let Some(run) = self.get(run_id).await? else {
            anyhow::bail!("sync run {run_id} not found");
        };

        let clamped = progress.clamp(run.progress, 100);
        let mut active: sync_run::ActiveModel = run.into();
        active.progress = Set(clamped);
        active.total_items = Set(total_items);
        active.processed_items = Set(processed_items);
        active.updated_at = Set(Utc::now().into());
        active.update(self.db.as_ref()).await?;
        Ok(())
    }

    /// Terminal success: progress forced to 100, completed_at stamped.
    pub async fn mark_completed(&self, run_id: Uuid) -> Result<()> {
        let Some(run) = self.get(run_id).await? else {
            anyhow::bail!("sync run {run_id} not found");
        };

        let now = Utc::now();
        let mut active: sync_run::ActiveModel = run.into();
        active.status = Set(STATUS_COMPLETED.to_string());
        active.progress = Set(100);
        active.completed_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());
        active.update(self.db.as_ref()).await?;
        Ok(())
    }

    /// Terminal failure with a non-empty message; an empty input is
    /// replaced by a generic one so failed runs are never silent.
    pub async fn mark_failed(&self, run_id: Uuid, message: &str) -> Result<()> {
        let Some(run) = self.get(run_id).await? else {
            anyhow::bail!("sync run {run_id} not found");
        };

        let message = if message.trim().is_empty() {
            "sync failed for an unknown reason".to_string()
        } else {
            message.to_string()
        };

        let now = Utc::now();
        let mut active: sync_run::ActiveModel = run.into();
        active.status = Set(STATUS_FAILED.to_string());
        active.error_message = Set(Some(message));
        active.completed_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());
        active.update(self.db.as_ref()).await?;
        Ok(())
    }

    /// Fail in_progress runs whose started_at predates the cutoff. Catches
    /// runs orphaned by a crashed instance, which would otherwise hold the
    /// partial unique index forever. Returns the failed run ids.
    pub async fn fail_stale(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<Vec<Uuid>> {
        let stale = SyncRun::find()
            .filter(sync_run::Column::Status.eq(STATUS_IN_PROGRESS))
            .filter(sync_run::Column::StartedAt.lt(cutoff))
            .all(self.db.as_ref())
            .await?;

        let mut failed = Vec::with_capacity(stale.len());
        for run in stale {
            let run_id = run.id;
            let now = Utc::now();
            let mut active: sync_run::ActiveModel = run.into();
            active.status = Set(STATUS_FAILED.to_string());
            active.error_message = Set(Some("Sync run abandoned after exceeding the maximum run duration".to_string()));
            active.completed_at = Set(Some(now.into()));
            active.updated_at = Set(now.into());
            active.update(self.db.as_ref()).await?;
            failed.push(run_id);
        }
        Ok(failed)
    }

    pub async fn get(&self, run_id: Uuid) -> Result<Option<sync_run::Model>> {
        Ok(SyncRun::find_by_id(run_id).one(self.db.as_ref()).await?)
    }

    /// Run fetched only when its campaign belongs to the user.
    pub async fn get_scoped(&self, user_id: Uuid, run_id: Uuid) -> Result<Option<sync_run::Model>> {
        Ok(Self::scoped(user_id)
            .filter(sync_run::Column::Id.eq(run_id))
            .one(self.db.as_ref())
            .await?)
    }

    /// Recent runs across the user's campaigns, newest first.
    pub async fn list_scoped(
        &self,
        user_id: Uuid,
        campaign_id: Option<Uuid>,
        status: Option<&str>,
        limit: u64,
    ) -> Result<Vec<sync_run::Model>> {
        let mut select = Self::scoped(user_id);

        if let Some(campaign_id) = campaign_id {
            select = select.filter(sync_run::Column::CampaignId.eq(campaign_id));
        }
        if let Some(status) = status {
            select = select.filter(sync_run::Column::Status.eq(status));
        }

        Ok(select
            .order_by_desc(sync_run::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?)
    }

    fn scoped(user_id: Uuid) -> sea_orm::Select<SyncRun> {
        SyncRun::find()
            .join(JoinType::InnerJoin, sync_run::Relation::Campaign.def())
            .join(
                JoinType::InnerJoin,
                campaign::Relation::ConnectedAccount.def(),
            )
            .filter(connected_account::Column::UserId.eq(user_id))
    }
}
