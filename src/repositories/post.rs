//! Post repository

use anyhow::Result;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, JoinType, PaginatorTrait, QueryFilter,
    QuerySelect, RelationTrait,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::post::{self, Entity as Post};
use crate::models::{campaign, connected_account};

/// Repository for post database operations
#[derive(Debug, Clone)]
pub struct PostRepository {
    pub db: Arc<DatabaseConnection>,
}

impl PostRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Idempotent upsert on (campaign_id, external_post_id).
    pub async fn upsert(&self, model: post::ActiveModel) -> Result<post::Model> {
        let result = Post::insert(model)
            .on_conflict(
                OnConflict::columns([post::Column::CampaignId, post::Column::ExternalPostId])
                    .update_columns([
                        post::Column::Title,
                        post::Column::IsPublic,
                        post::Column::IsPaid,
                        post::Column::LikeCount,
                        post::Column::CommentCount,
                        post::Column::PublishedAt,
                        post::Column::EditedAt,
                        post::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_with_returning(self.db.as_ref())
            .await?;
        Ok(result)
    }

    /// Number of posts stored across the user's campaigns, optionally
    /// narrowed to one campaign.
    pub async fn count_for_user(&self, user_id: Uuid, campaign_id: Option<Uuid>) -> Result<u64> {
        let mut select = Post::find()
            .join(JoinType::InnerJoin, post::Relation::Campaign.def())
            .join(
                JoinType::InnerJoin,
                campaign::Relation::ConnectedAccount.def(),
            )
            .filter(connected_account::Column::UserId.eq(user_id));

        if let Some(campaign_id) = campaign_id {
            select = select.filter(post::Column::CampaignId.eq(campaign_id));
        }

        Ok(select.count(self.db.as_ref()).await?)
    }
}
