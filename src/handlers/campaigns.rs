//! # Campaign Handlers

use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::repositories::CampaignRepository;
use crate::server::AppState;

/// Campaign information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CampaignInfo {
    /// Unique identifier for the campaign
    #[schema(value_type = String)]
    pub id: Uuid,
    /// Owning connected account id
    #[schema(value_type = String)]
    pub account_id: Uuid,
    /// Patreon campaign id
    pub external_campaign_id: String,
    /// Campaign display name
    pub name: String,
    /// Cached active patron count (as of the last completed sync)
    pub patron_count: i32,
    /// Cached entitled pledge sum in minor currency units
    pub pledge_sum_cents: i64,
    /// Campaign currency code
    pub currency: String,
    /// Instant of the last successful sync (RFC 3339)
    pub last_synced_at: Option<String>,
    /// Whether the campaign is active on the platform
    pub is_active: bool,
    /// Whether a webhook secret is configured for the campaign
    pub webhook_configured: bool,
}

impl From<crate::models::campaign::Model> for CampaignInfo {
    fn from(model: crate::models::campaign::Model) -> Self {
        Self {
            id: model.id,
            account_id: model.account_id,
            external_campaign_id: model.external_campaign_id,
            name: model.name,
            patron_count: model.patron_count,
            pledge_sum_cents: model.pledge_sum_cents,
            currency: model.currency,
            last_synced_at: model
                .last_synced_at
                .map(|dt| DateTime::<Utc>::from(dt).to_rfc3339()),
            is_active: model.is_active,
            webhook_configured: model.webhook_secret.is_some(),
        }
    }
}

/// Response wrapper for campaign listings
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CampaignsResponse {
    /// Campaigns across all of the user's connected accounts
    pub campaigns: Vec<CampaignInfo>,
}

/// List campaigns across the current user's connected accounts
#[utoipa::path(
    get,
    path = "/campaigns",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Campaigns for the user", body = CampaignsResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "campaigns"
)]
pub async fn list_campaigns(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<CampaignsResponse>, ApiError> {
    let repo = CampaignRepository::new(Arc::new(state.db.clone()));
    let campaigns = repo.list_for_user(user.id).await?;

    Ok(Json(CampaignsResponse {
        campaigns: campaigns.into_iter().map(CampaignInfo::from).collect(),
    }))
}

const WEBHOOK_SECRET_LEN: usize = 48;

/// Response carrying a freshly rotated webhook secret.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookSecretResponse {
    /// Campaign the secret belongs to
    #[schema(value_type = String)]
    pub campaign_id: Uuid,
    /// The new shared secret. Shown once; store it in the Patreon webhook
    /// configuration.
    pub webhook_secret: String,
}

/// Generate and store a webhook secret for a campaign
///
/// Rotating the secret invalidates deliveries signed with the old one.
#[utoipa::path(
    post,
    path = "/campaigns/{id}/webhook",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "New webhook secret", body = WebhookSecretResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Campaign not found", body = ApiError)
    ),
    tag = "campaigns"
)]
pub async fn rotate_webhook_secret(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<WebhookSecretResponse>, ApiError> {
    let repo = CampaignRepository::new(Arc::new(state.db.clone()));
    let campaign = repo
        .get_owned(user.id, id)
        .await?
        .ok_or_else(|| crate::error::not_found("Campaign not found"))?;

    let secret: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(WEBHOOK_SECRET_LEN)
        .map(char::from)
        .collect();

    repo.set_webhook_secret(campaign.id, &secret).await?;
    info!(user_id = %user.id, campaign_id = %campaign.id, "Rotated webhook secret");

    Ok(Json(WebhookSecretResponse {
        campaign_id: campaign.id,
        webhook_secret: secret,
    }))
}
