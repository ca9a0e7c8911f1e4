//! Dashboard metrics repository
//!
//! Aggregates the cached campaign figures across a user's accounts and
//! computes the period-over-period pledge change against snapshots aged
//! 30 to 60 days. A user with no connected accounts gets all zeros.

use anyhow::Result;
use chrono::{Duration, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, JoinType, QueryFilter, QuerySelect, RelationTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{campaign, connected_account};
use crate::repositories::{PostRepository, RevenueSnapshotRepository};

/// Aggregate dashboard figures across all of a user's campaigns.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardMetrics {
    pub campaign_count: i64,
    pub patron_count: i64,
    pub pledge_sum_cents: i64,
    pub post_count: i64,
    /// Pledge change versus 30 days ago, in percent. 0.0 when no prior
    /// snapshot exists or the prior sum was zero.
    pub pledge_change_pct: f64,
}

impl DashboardMetrics {
    pub fn zero() -> Self {
        Self {
            campaign_count: 0,
            patron_count: 0,
            pledge_sum_cents: 0,
            post_count: 0,
            pledge_change_pct: 0.0,
        }
    }
}

/// Change percentage between a prior and current pledge sum. A zero or
/// missing prior denominator saturates to 0 instead of dividing.
pub fn change_pct(prior_cents: i64, current_cents: i64) -> f64 {
    if prior_cents <= 0 {
        return 0.0;
    }
    (current_cents - prior_cents) as f64 / prior_cents as f64 * 100.0
}

/// Repository for dashboard aggregate queries
#[derive(Debug, Clone)]
pub struct MetricsRepository {
    db: Arc<DatabaseConnection>,
    posts: PostRepository,
    snapshots: RevenueSnapshotRepository,
}

impl MetricsRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            posts: PostRepository::new(db.clone()),
            snapshots: RevenueSnapshotRepository::new(db.clone()),
            db,
        }
    }

    pub async fn dashboard(&self, user_id: Uuid) -> Result<DashboardMetrics> {
        let campaigns = campaign::Entity::find()
            .join(
                JoinType::InnerJoin,
                campaign::Relation::ConnectedAccount.def(),
            )
            .filter(connected_account::Column::UserId.eq(user_id))
            .all(self.db.as_ref())
            .await?;

        if campaigns.is_empty() {
            return Ok(DashboardMetrics::zero());
        }

        let patron_count: i64 = campaigns.iter().map(|c| i64::from(c.patron_count)).sum();
        let pledge_sum_cents: i64 = campaigns.iter().map(|c| c.pledge_sum_cents).sum();

        let post_count = self.posts.count_for_user(user_id, None).await? as i64;
        let prior_sum = self.prior_pledge_sum(user_id).await?;

        Ok(DashboardMetrics {
            campaign_count: campaigns.len() as i64,
            patron_count,
            pledge_sum_cents,
            post_count,
            pledge_change_pct: change_pct(prior_sum, pledge_sum_cents),
        })
    }

    /// Sum of pledge_sum_cents over each campaign's most recent snapshot
    /// aged between 30 and 60 days. Campaigns with no snapshot in the
    /// window contribute nothing.
    async fn prior_pledge_sum(&self, user_id: Uuid) -> Result<i64> {
        let today = Utc::now().date_naive();
        let window_start = today - Duration::days(60);
        let window_end = today - Duration::days(30);

        let snapshots = self
            .snapshots
            .latest_in_window(user_id, window_start, window_end)
            .await?;

        // Newest first, so the first snapshot seen per campaign wins.
        let mut latest_per_campaign: HashMap<Uuid, i64> = HashMap::new();
        for snapshot in snapshots {
            latest_per_campaign
                .entry(snapshot.campaign_id)
                .or_insert(snapshot.pledge_sum_cents);
        }

        Ok(latest_per_campaign.values().sum())
    }
}

#[cfg(test)]
mod tests {
    use super::change_pct;

    #[test]
    fn change_pct_saturates_on_zero_prior() {
        assert_eq!(change_pct(0, 5_000), 0.0);
        assert_eq!(change_pct(-100, 5_000), 0.0);
    }

    #[test]
    fn change_pct_computes_growth_and_decline() {
        assert_eq!(change_pct(10_000, 12_500), 25.0);
        assert_eq!(change_pct(10_000, 7_500), -25.0);
        assert_eq!(change_pct(10_000, 10_000), 0.0);
    }
}
