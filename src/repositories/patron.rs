//! Patron repository
//!
//! Upserts on (campaign_id, external_user_id) with last-write-wins
//! semantics, keyset-paginated listings scoped through the requesting
//! user's accounts, and the aggregate recompute used after every sync.

use anyhow::Result;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, JoinType,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::cursor::CursorData;
use crate::models::patron::{self, Entity as Patron, STATUS_ACTIVE, STATUS_FORMER};
use crate::models::{campaign, connected_account};

/// Aggregate figures recomputed from persisted patron rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatronAggregates {
    pub patron_count: i32,
    pub pledge_sum_cents: i64,
}

/// Filters for patron listings.
#[derive(Debug, Clone, Default)]
pub struct PatronQuery {
    pub campaign_id: Option<Uuid>,
    pub search: Option<String>,
    pub cursor: Option<CursorData>,
    pub limit: u64,
}

/// Repository for patron database operations
#[derive(Debug, Clone)]
pub struct PatronRepository {
    pub db: Arc<DatabaseConnection>,
}

impl PatronRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Idempotent upsert on (campaign_id, external_user_id); the incoming
    /// row wins every mapped field.
    pub async fn upsert(&self, model: patron::ActiveModel) -> Result<patron::Model> {
        let result = Patron::insert(model)
            .on_conflict(
                OnConflict::columns([patron::Column::CampaignId, patron::Column::ExternalUserId])
                    .update_columns([
                        patron::Column::FullName,
                        patron::Column::Email,
                        patron::Column::Status,
                        patron::Column::EntitledAmountCents,
                        patron::Column::LifetimeSupportCents,
                        patron::Column::Currency,
                        patron::Column::PledgeCapReached,
                        patron::Column::PledgeStart,
                        patron::Column::LastChargeDate,
                        patron::Column::LastChargeStatus,
                        patron::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_with_returning(self.db.as_ref())
            .await?;
        Ok(result)
    }

    /// Transition a supporter to `former` with entitlement zeroed. Returns
    /// whether a matching row existed.
    pub async fn mark_former(&self, campaign_id: Uuid, external_user_id: &str) -> Result<bool> {
        let existing = Patron::find()
            .filter(patron::Column::CampaignId.eq(campaign_id))
            .filter(patron::Column::ExternalUserId.eq(external_user_id))
            .one(self.db.as_ref())
            .await?;

        match existing {
            Some(row) => {
                let mut active: patron::ActiveModel = row.into();
                active.status = Set(STATUS_FORMER.to_string());
                active.entitled_amount_cents = Set(0);
                active.updated_at = Set(Utc::now().into());
                active.update(self.db.as_ref()).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Recompute (active patron count, entitled pledge sum) from the rows
    /// persisted for the campaign.
    pub async fn aggregates(&self, campaign_id: Uuid) -> Result<PatronAggregates> {
        let amounts: Vec<i64> = Patron::find()
            .filter(patron::Column::CampaignId.eq(campaign_id))
            .filter(patron::Column::Status.eq(STATUS_ACTIVE))
            .select_only()
            .column(patron::Column::EntitledAmountCents)
            .into_tuple()
            .all(self.db.as_ref())
            .await?;

        Ok(PatronAggregates {
            patron_count: amounts.len() as i32,
            pledge_sum_cents: amounts.iter().sum(),
        })
    }

    /// External user ids of the campaign's currently active patrons,
    /// captured on snapshots for the next new/lost diff.
    pub async fn active_external_ids(&self, campaign_id: Uuid) -> Result<Vec<String>> {
        Ok(Patron::find()
            .filter(patron::Column::CampaignId.eq(campaign_id))
            .filter(patron::Column::Status.eq(STATUS_ACTIVE))
            .select_only()
            .column(patron::Column::ExternalUserId)
            .order_by_asc(patron::Column::ExternalUserId)
            .into_tuple()
            .all(self.db.as_ref())
            .await?)
    }

    fn scoped_query(user_id: Uuid, query: &PatronQuery) -> sea_orm::Select<Patron> {
        let mut select = Patron::find()
            .join(JoinType::InnerJoin, patron::Relation::Campaign.def())
            .join(
                JoinType::InnerJoin,
                campaign::Relation::ConnectedAccount.def(),
            )
            .filter(connected_account::Column::UserId.eq(user_id));

        if let Some(campaign_id) = query.campaign_id {
            select = select.filter(patron::Column::CampaignId.eq(campaign_id));
        }

        if let Some(ref term) = query.search {
            select = select.filter(
                Condition::any()
                    .add(patron::Column::FullName.contains(term))
                    .add(patron::Column::Email.contains(term)),
            );
        }

        select
    }

    /// One page of patrons ordered by (created_at, id), with the cursor for
    /// the next page when more rows remain.
    pub async fn list_page(
        &self,
        user_id: Uuid,
        query: &PatronQuery,
    ) -> Result<(Vec<patron::Model>, Option<CursorData>)> {
        let mut select = Self::scoped_query(user_id, query)
            .order_by_asc(patron::Column::CreatedAt)
            .order_by_asc(patron::Column::Id);

        if let Some(ref cursor) = query.cursor {
            let after: sea_orm::prelude::DateTimeWithTimeZone = cursor.created_at.into();
            select = select.filter(
                Condition::any()
                    .add(patron::Column::CreatedAt.gt(after))
                    .add(
                        Condition::all()
                            .add(patron::Column::CreatedAt.eq(after))
                            .add(patron::Column::Id.gt(cursor.id)),
                    ),
            );
        }

        // Fetch one extra row to learn whether another page exists.
        let mut rows = select.limit(query.limit + 1).all(self.db.as_ref()).await?;

        let next = if rows.len() as u64 > query.limit {
            rows.truncate(query.limit as usize);
            rows.last().map(|row| CursorData {
                created_at: row.created_at.to_utc(),
                id: row.id,
            })
        } else {
            None
        };

        Ok((rows, next))
    }

    /// Every patron matching the filters, for CSV export.
    pub async fn list_all(&self, user_id: Uuid, query: &PatronQuery) -> Result<Vec<patron::Model>> {
        Ok(Self::scoped_query(user_id, query)
            .order_by_asc(patron::Column::CreatedAt)
            .order_by_asc(patron::Column::Id)
            .all(self.db.as_ref())
            .await?)
    }
}
