//! SyncRun entity model
//!
//! One row per synchronization attempt. States: pending, in_progress,
//! completed, failed. Terminal states are never retried automatically; a
//! failed run is restarted by creating a brand-new row.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// SyncRun status values persisted in the status column.
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_runs")]
pub struct Model {
    /// Unique identifier for the sync run (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Campaign being synchronized
    pub campaign_id: Uuid,

    /// One of: pending, in_progress, completed, failed
    pub status: String,

    /// Progress percentage in [0, 100], non-decreasing within a run
    pub progress: i32,

    /// Total items reported by the remote API for the current phase
    pub total_items: i32,

    /// Items processed so far across both phases
    pub processed_items: i32,

    /// Human-readable failure message (set only on failed runs)
    pub error_message: Option<String>,

    /// Instant the run entered in_progress
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Instant the run reached a terminal state
    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the run was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the run was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::campaign::Entity",
        from = "Column::CampaignId",
        to = "super::campaign::Column::Id"
    )]
    Campaign,
}

impl Related<super::campaign::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Campaign.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
