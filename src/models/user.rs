//! User entity model
//!
//! Dashboard owners. The api_token column backs bearer authentication for
//! all frontend-facing routes.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Unique identifier for the user (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Display name shown in the dashboard
    pub display_name: String,

    /// Contact email (optional)
    pub email: Option<String>,

    /// Bearer token used by the frontend to authenticate
    pub api_token: String,

    /// Timestamp when the user was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the user was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::connected_account::Entity")]
    ConnectedAccount,
}

impl Related<super::connected_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ConnectedAccount.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
