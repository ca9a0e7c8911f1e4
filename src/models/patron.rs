//! Patron entity model
//!
//! Campaign-scoped supporters, upserted on (campaign_id, external_user_id).
//! The single active pledge relation is folded into the row: amount,
//! currency and cap flag describe the current pledge, lifetime_support_cents
//! the historical total. Departed supporters keep their row with status
//! 'former'.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Patron status values persisted in the status column.
pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_DECLINED: &str = "declined";
pub const STATUS_FORMER: &str = "former";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "patrons")]
pub struct Model {
    /// Unique identifier for the patron row (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Campaign this supporter belongs to
    pub campaign_id: Uuid,

    /// Patreon user id of the supporter
    pub external_user_id: String,

    /// Supporter display name
    pub full_name: String,

    /// Supporter email, when exposed by the platform
    pub email: Option<String>,

    /// One of: active, declined, former
    pub status: String,

    /// Currently entitled pledge amount in minor currency units
    pub entitled_amount_cents: i64,

    /// Lifetime support total in minor currency units
    pub lifetime_support_cents: i64,

    /// Pledge currency code
    pub currency: String,

    /// Whether the pledge cap has been reached
    pub pledge_cap_reached: bool,

    /// Instant the relationship started
    pub pledge_start: Option<DateTimeWithTimeZone>,

    /// Instant of the most recent charge attempt
    pub last_charge_date: Option<DateTimeWithTimeZone>,

    /// Status of the most recent charge (e.g. Paid, Declined)
    pub last_charge_status: Option<String>,

    /// Timestamp when the patron row was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the patron row was last updated
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
