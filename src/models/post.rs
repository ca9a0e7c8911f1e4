//! Post entity model
//!
//! Content items published under a campaign, upserted on
//! (campaign_id, external_post_id). Never deleted by sync.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "posts")]
pub struct Model {
    /// Unique identifier for the post row (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Campaign the post was published under
    pub campaign_id: Uuid,

    /// Patreon post id
    pub external_post_id: String,

    /// Post title
    pub title: String,

    /// Visible to the public
    pub is_public: bool,

    /// Restricted to paying patrons
    pub is_paid: bool,

    /// Like counter reported by the platform
    pub like_count: i32,

    /// Comment counter reported by the platform
    pub comment_count: i32,

    /// Publication instant
    pub published_at: Option<DateTimeWithTimeZone>,

    /// Last edit instant
    pub edited_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the post row was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the post row was last updated
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
