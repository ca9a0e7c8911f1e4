//! # Revenue and Dashboard Metric Handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::models::revenue_snapshot;
use crate::repositories::metrics::DashboardMetrics;
use crate::repositories::{MetricsRepository, RevenueSnapshotRepository};
use crate::server::AppState;

const DEFAULT_RANGE_DAYS: i64 = 30;
const MAX_RANGE_DAYS: i64 = 366;

/// Query parameters for the revenue series
#[derive(Debug, Deserialize, Serialize, IntoParams, ToSchema)]
pub struct RevenueQuery {
    /// Series start date (inclusive, default: 30 days ago)
    #[param(value_type = Option<String>, example = "2024-04-01")]
    pub from: Option<NaiveDate>,
    /// Series end date (inclusive, default: today)
    #[param(value_type = Option<String>, example = "2024-05-01")]
    pub to: Option<NaiveDate>,
    /// Optional campaign filter
    #[param(value_type = Option<String>)]
    pub campaign_id: Option<Uuid>,
}

/// One dated revenue point for a campaign
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevenuePoint {
    /// Campaign the point belongs to
    #[schema(value_type = String)]
    pub campaign_id: Uuid,
    /// Snapshot date (ISO 8601)
    #[schema(value_type = String)]
    pub date: NaiveDate,
    /// Active patron count as of the date
    pub patron_count: i32,
    /// Pledge sum in minor currency units as of the date
    pub pledge_sum_cents: i64,
    /// Patrons gained since the previous snapshot
    pub new_patrons: i32,
    /// Patrons lost since the previous snapshot
    pub lost_patrons: i32,
}

impl From<revenue_snapshot::Model> for RevenuePoint {
    fn from(model: revenue_snapshot::Model) -> Self {
        Self {
            campaign_id: model.campaign_id,
            date: model.date,
            patron_count: model.patron_count,
            pledge_sum_cents: model.pledge_sum_cents,
            new_patrons: model.new_patrons,
            lost_patrons: model.lost_patrons,
        }
    }
}

/// Response wrapper for the revenue series
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevenueResponse {
    /// Effective start of the series
    #[schema(value_type = String)]
    pub from: NaiveDate,
    /// Effective end of the series
    #[schema(value_type = String)]
    pub to: NaiveDate,
    /// Snapshot points, oldest first
    pub points: Vec<RevenuePoint>,
}

/// Revenue snapshot series over a date range
#[utoipa::path(
    get,
    path = "/revenue",
    security(("bearer_auth" = [])),
    params(RevenueQuery),
    responses(
        (status = 200, description = "Snapshot series", body = RevenueResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "revenue"
)]
pub async fn revenue_series(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<RevenueQuery>,
) -> Result<Json<RevenueResponse>, ApiError> {
    let to = query.to.unwrap_or_else(|| Utc::now().date_naive());
    let from = query.from.unwrap_or(to - Duration::days(DEFAULT_RANGE_DAYS));

    if from > to {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "from must not be after to",
        ));
    }
    if (to - from).num_days() > MAX_RANGE_DAYS {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED".to_string(),
            format!("date range must not exceed {} days", MAX_RANGE_DAYS),
        ));
    }

    let repo = RevenueSnapshotRepository::new(Arc::new(state.db.clone()));
    let points = repo.series(user.id, query.campaign_id, from, to).await?;

    Ok(Json(RevenueResponse {
        from,
        to,
        points: points.into_iter().map(RevenuePoint::from).collect(),
    }))
}

/// Aggregate dashboard metrics across the user's campaigns
#[utoipa::path(
    get,
    path = "/metrics/dashboard",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Dashboard metrics; all zeros for users with no accounts", body = DashboardMetrics),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "revenue"
)]
pub async fn dashboard_metrics(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<DashboardMetrics>, ApiError> {
    let repo = MetricsRepository::new(Arc::new(state.db.clone()));
    Ok(Json(repo.dashboard(user.id).await?))
}
