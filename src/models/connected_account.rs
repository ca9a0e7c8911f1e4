//! ConnectedAccount entity model
//!
//! One Patreon identity linked to one dashboard user, holding the encrypted
//! OAuth credential pair. Deleting an account cascades to its campaigns.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "connected_accounts")]
pub struct Model {
    /// Unique identifier for the account link (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Owning dashboard user
    pub user_id: Uuid,

    /// Patreon user id for this identity
    pub external_user_id: String,

    /// Display name reported by the identity endpoint
    pub display_name: String,

    /// Encrypted access token ciphertext
    pub access_token_ciphertext: Option<Vec<u8>>,

    /// Encrypted refresh token ciphertext
    pub refresh_token_ciphertext: Option<Vec<u8>>,

    /// Instant the current access token expires
    pub token_expires_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the account was linked
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the account was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_many = "super::campaign::Entity")]
    Campaign,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::campaign::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Campaign.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
