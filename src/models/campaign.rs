//! Campaign entity model
//!
//! patron_count and pledge_sum_cents are derived caches: after any completed
//! sync they equal the sums over active patron rows for the campaign.
//! Staleness between syncs is expected and tolerated.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "campaigns")]
pub struct Model {
    /// Unique identifier for the campaign (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Owning connected account
    pub account_id: Uuid,

    /// Patreon campaign id
    pub external_campaign_id: String,

    /// Campaign display name
    pub name: String,

    /// Cached count of active patrons
    pub patron_count: i32,

    /// Cached sum of entitled pledge amounts in minor currency units
    pub pledge_sum_cents: i64,

    /// Campaign currency code
    pub currency: String,

    /// Instant of the last successful sync
    pub last_synced_at: Option<DateTimeWithTimeZone>,

    /// Whether the campaign is active on the platform
    pub is_active: bool,

    /// Per-campaign webhook shared secret (unset until configured)
    pub webhook_secret: Option<String>,

    /// Timestamp when the campaign was imported
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the campaign was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::connected_account::Entity",
        from = "Column::AccountId",
        to = "super::connected_account::Column::Id"
    )]
    ConnectedAccount,
    #[sea_orm(has_many = "super::patron::Entity")]
    Patron,
    #[sea_orm(has_many = "super::post::Entity")]
    Post,
    #[sea_orm(has_many = "super::sync_run::Entity")]
    SyncRun,
}

impl Related<super::connected_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ConnectedAccount.def()
    }
}

impl Related<super::patron::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Patron.def()
    }
}

impl Related<super::post::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Post.def()
    }
}

impl Related<super::sync_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncRun.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
