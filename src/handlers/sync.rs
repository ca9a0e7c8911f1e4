//! # Sync Trigger and Status Handlers
//!
//! Triggers return 202 with the pending run(s); the work itself continues
//! in the background and is observed by polling the run endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::models::sync_run;
use crate::repositories::SyncRunRepository;
use crate::server::AppState;

const DEFAULT_RUNS_LIMIT: i64 = 20;
const MAX_RUNS_LIMIT: i64 = 100;

const KNOWN_STATUSES: &[&str] = &[
    sync_run::STATUS_PENDING,
    sync_run::STATUS_IN_PROGRESS,
    sync_run::STATUS_COMPLETED,
    sync_run::STATUS_FAILED,
];

/// Sync run information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncRunInfo {
    /// Unique identifier for the run
    #[schema(value_type = String)]
    pub id: Uuid,
    /// Campaign being synchronized
    #[schema(value_type = String)]
    pub campaign_id: Uuid,
    /// One of: pending, in_progress, completed, failed
    pub status: String,
    /// Progress percentage in [0, 100]
    pub progress: i32,
    /// Total items reported by the remote API
    pub total_items: i32,
    /// Items processed so far
    pub processed_items: i32,
    /// Failure message (failed runs only)
    pub error_message: Option<String>,
    /// Instant the run started (RFC 3339)
    pub started_at: Option<String>,
    /// Instant the run reached a terminal state (RFC 3339)
    pub completed_at: Option<String>,
    /// Instant the run was triggered (RFC 3339)
    pub created_at: String,
}

impl From<sync_run::Model> for SyncRunInfo {
    fn from(model: sync_run::Model) -> Self {
        Self {
            id: model.id,
            campaign_id: model.campaign_id,
            status: model.status,
            progress: model.progress,
            total_items: model.total_items,
            processed_items: model.processed_items,
            error_message: model.error_message,
            started_at: model
                .started_at
                .map(|dt| DateTime::<Utc>::from(dt).to_rfc3339()),
            completed_at: model
                .completed_at
                .map(|dt| DateTime::<Utc>::from(dt).to_rfc3339()),
            created_at: DateTime::<Utc>::from(model.created_at).to_rfc3339(),
        }
    }
}

/// Response for sync triggers
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncTriggerResponse {
    /// Pending runs created by the trigger
    pub runs: Vec<SyncRunInfo>,
}

/// Query parameters for the run listing
#[derive(Debug, Deserialize, Serialize, IntoParams, ToSchema)]
pub struct ListRunsQuery {
    /// Optional campaign filter
    #[param(value_type = Option<String>)]
    pub campaign_id: Option<Uuid>,
    /// Optional status filter (pending, in_progress, completed, failed)
    pub status: Option<String>,
    /// Maximum number of runs to return (default: 20, max: 100)
    pub limit: Option<i64>,
}

/// Trigger a sync for a single campaign
#[utoipa::path(
    post,
    path = "/sync/campaigns/{id}",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Campaign id")),
    responses(
        (status = 202, description = "Sync accepted", body = SyncTriggerResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Campaign not found", body = ApiError),
        (status = 409, description = "Campaign is already syncing", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn trigger_campaign_sync(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SyncTriggerResponse>), ApiError> {
    let run = state.sync.trigger_campaign(user.id, id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SyncTriggerResponse {
            runs: vec![SyncRunInfo::from(run)],
        }),
    ))
}

/// Trigger syncs for every campaign under a connected account
#[utoipa::path(
    post,
    path = "/sync/accounts/{id}",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Connected account id")),
    responses(
        (status = 202, description = "Syncs accepted; campaigns already syncing are skipped", body = SyncTriggerResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Account not found", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn trigger_account_sync(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SyncTriggerResponse>), ApiError> {
    let runs = state.sync.trigger_account(user.id, id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SyncTriggerResponse {
            runs: runs.into_iter().map(SyncRunInfo::from).collect(),
        }),
    ))
}

/// Trigger syncs for every campaign across all connected accounts
#[utoipa::path(
    post,
    path = "/sync",
    security(("bearer_auth" = [])),
    responses(
        (status = 202, description = "Syncs accepted; campaigns already syncing are skipped", body = SyncTriggerResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn trigger_full_sync(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<(StatusCode, Json<SyncTriggerResponse>), ApiError> {
    let runs = state.sync.trigger_all(user.id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SyncTriggerResponse {
            runs: runs.into_iter().map(SyncRunInfo::from).collect(),
        }),
    ))
}

/// Poll a single sync run
#[utoipa::path(
    get,
    path = "/sync/runs/{id}",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Sync run id")),
    responses(
        (status = 200, description = "Run status", body = SyncRunInfo),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Run not found", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn get_sync_run(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SyncRunInfo>, ApiError> {
    let repo = SyncRunRepository::new(Arc::new(state.db.clone()));
    let run = repo
        .get_scoped(user.id, id)
        .await?
        .ok_or_else(|| crate::error::not_found("Sync run not found"))?;

    Ok(Json(SyncRunInfo::from(run)))
}

/// List recent sync runs across the user's campaigns
#[utoipa::path(
    get,
    path = "/sync/runs",
    security(("bearer_auth" = [])),
    params(ListRunsQuery),
    responses(
        (status = 200, description = "Recent runs, newest first", body = [SyncRunInfo]),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn list_sync_runs(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Vec<SyncRunInfo>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_RUNS_LIMIT);
    if !(1..=MAX_RUNS_LIMIT).contains(&limit) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED".to_string(),
            format!("limit must be between 1 and {}", MAX_RUNS_LIMIT),
        ));
    }

    if let Some(ref status) = query.status {
        if !KNOWN_STATUSES.contains(&status.as_str()) {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED".to_string(),
                format!("unknown status '{}'", status),
            ));
        }
    }

    let repo = SyncRunRepository::new(Arc::new(state.db.clone()));
    let runs = repo
        .list_scoped(
            user.id,
            query.campaign_id,
            query.status.as_deref(),
            limit as u64,
        )
        .await?;

    Ok(Json(runs.into_iter().map(SyncRunInfo::from).collect()))
}
