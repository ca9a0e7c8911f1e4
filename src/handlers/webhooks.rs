//! # Patreon Webhook Ingestor
//!
//! Receives signed event deliveries per campaign. Member events flow
//! through the same mapping function the sync orchestrator uses, so a
//! webhook can never produce a row shape a sync would not. Aggregates are
//! recomputed synchronously after every member mutation.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::campaign;
use crate::patreon::mapping::{map_patron, map_post};
use crate::patreon::resource::Document;
use crate::repositories::{CampaignRepository, PatronRepository, PostRepository};
use crate::server::AppState;
use crate::webhook_verification::verify_delivery;

/// Acknowledgement returned for accepted deliveries.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    /// Event trigger that was delivered
    pub event: String,
    /// Whether the event mutated local state
    pub processed: bool,
}

/// Receive a signed Patreon webhook delivery for a campaign
#[utoipa::path(
    post,
    path = "/webhooks/patreon/{campaign_external_id}",
    params(("campaign_external_id" = String, Path, description = "Patreon campaign id")),
    responses(
        (status = 200, description = "Delivery accepted", body = WebhookAck),
        (status = 400, description = "Missing event header or malformed payload", body = ApiError),
        (status = 401, description = "Signature rejected or secret not configured", body = ApiError),
        (status = 404, description = "Unknown campaign", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(campaign_external_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let campaign_repo = CampaignRepository::new(Arc::new(state.db.clone()));
    let campaign = campaign_repo
        .get_by_external_id(&campaign_external_id)
        .await?
        .ok_or_else(|| crate::error::not_found("Unknown campaign"))?;

    let event = verify_delivery(&headers, &body, campaign.webhook_secret.as_deref())
        .map_err(|err| {
            counter!("webhooks_rejected_total").increment(1);
            ApiError::new(err.status_code(), "WEBHOOK_REJECTED".to_string(), err.to_string())
        })?;

    counter!("webhooks_received_total").increment(1);

    let processed = dispatch_event(&state, &campaign, &event, &body).await?;

    info!(
        campaign_id = %campaign.id,
        event = %event,
        processed,
        "Processed webhook delivery"
    );

    Ok(Json(WebhookAck { event, processed }))
}

async fn dispatch_event(
    state: &AppState,
    campaign: &campaign::Model,
    event: &str,
    body: &[u8],
) -> Result<bool, ApiError> {
    match event {
        "members:create" | "members:update" | "members:pledge:create"
        | "members:pledge:update" => {
            let document = parse_document(body)?;
            upsert_member(state, campaign, &document).await?;
            recompute_aggregates(state, campaign).await?;
            Ok(true)
        }
        "members:delete" | "members:pledge:delete" => {
            let document = parse_document(body)?;
            let changed = retire_member(state, campaign, &document).await?;
            if changed {
                recompute_aggregates(state, campaign).await?;
            }
            Ok(changed)
        }
        "posts:publish" | "posts:update" => {
            let document = parse_document(body)?;
            upsert_post(state, campaign, &document).await?;
            Ok(true)
        }
        "posts:delete" => {
            // Posts are never deleted locally; acknowledge and move on.
            info!(campaign_id = %campaign.id, "Ignoring posts:delete event");
            Ok(false)
        }
        other => {
            warn!(campaign_id = %campaign.id, event = %other, "Ignoring unknown webhook event");
            Ok(false)
        }
    }
}

fn parse_document(body: &[u8]) -> Result<Document, ApiError> {
    serde_json::from_slice(body).map_err(|err| {
        crate::error::validation_error(
            "Malformed webhook payload",
            serde_json::json!({ "parse_error": err.to_string() }),
        )
    })
}

fn primary_resource(document: &Document) -> Result<&crate::patreon::resource::Resource, ApiError> {
    document.primary().ok_or_else(|| {
        crate::error::validation_error(
            "Webhook payload has no primary resource",
            serde_json::json!({}),
        )
    })
}

async fn upsert_member(
    state: &AppState,
    campaign: &campaign::Model,
    document: &Document,
) -> Result<(), ApiError> {
    let member = primary_resource(document)?;
    let included = document.included_index();

    let model = map_patron(campaign.id, &campaign.currency, member, &included)
        .map_err(|err| crate::error::validation_error(&err.to_string(), serde_json::json!({})))?;

    let repo = PatronRepository::new(Arc::new(state.db.clone()));
    repo.upsert(model).await?;
    Ok(())
}

/// Transition the delivered member to `former` with entitlement zeroed.
async fn retire_member(
    state: &AppState,
    campaign: &campaign::Model,
    document: &Document,
) -> Result<bool, ApiError> {
    let member = primary_resource(document)?;
    let external_user_id = member.related_id("user").ok_or_else(|| {
        crate::error::validation_error(
            "Member resource has no user relationship",
            serde_json::json!({}),
        )
    })?;

    let repo = PatronRepository::new(Arc::new(state.db.clone()));
    let changed = repo.mark_former(campaign.id, external_user_id).await?;
    if !changed {
        warn!(
            campaign_id = %campaign.id,
            external_user_id,
            "Delete event for unknown patron"
        );
    }
    Ok(changed)
}

async fn upsert_post(
    state: &AppState,
    campaign: &campaign::Model,
    document: &Document,
) -> Result<(), ApiError> {
    let resource = primary_resource(document)?;
    let model = map_post(campaign.id, resource)
        .map_err(|err| crate::error::validation_error(&err.to_string(), serde_json::json!({})))?;

    let repo = PostRepository::new(Arc::new(state.db.clone()));
    repo.upsert(model).await?;
    Ok(())
}

async fn recompute_aggregates(
    state: &AppState,
    campaign: &campaign::Model,
) -> Result<(), ApiError> {
    let patrons = PatronRepository::new(Arc::new(state.db.clone()));
    let aggregates = patrons.aggregates(campaign.id).await?;

    let campaigns = CampaignRepository::new(Arc::new(state.db.clone()));
    campaigns
        .update_aggregates(campaign.id, aggregates.patron_count, aggregates.pledge_sum_cents)
        .await?;
    Ok(())
}
