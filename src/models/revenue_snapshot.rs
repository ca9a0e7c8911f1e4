//! RevenueSnapshot entity model
//!
//! One dated aggregate row per campaign, upserted on (campaign_id, date).
//! patron_ids is the active patron id set at snapshot time; the next sync
//! diffs against it to fill new_patrons/lost_patrons.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "revenue_snapshots")]
pub struct Model {
    /// Unique identifier for the snapshot (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Campaign the snapshot belongs to
    pub campaign_id: Uuid,

    /// Calendar date of the snapshot (date-truncated)
    pub date: Date,

    /// Active patron count as of the date
    pub patron_count: i32,

    /// Pledge sum in minor currency units as of the date
    pub pledge_sum_cents: i64,

    /// Patrons present today but absent from the previous snapshot
    pub new_patrons: i32,

    /// Patrons present in the previous snapshot but gone today
    pub lost_patrons: i32,

    /// Active patron external-id set captured for the next diff
    #[sea_orm(column_type = "JsonBinary")]
    pub patron_ids: Option<JsonValue>,

    /// Timestamp when the snapshot was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the snapshot was last updated
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
