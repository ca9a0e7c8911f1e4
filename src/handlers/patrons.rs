//! # Patron Handlers
//!
//! Cursor-paginated patron listing with free-text search, and the CSV
//! export used by the dashboard. The export always emits the header row,
//! even when no patron matches.

use axum::{
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::cursor::{decode_cursor, encode_cursor};
use crate::error::ApiError;
use crate::models::patron;
use crate::repositories::PatronRepository;
use crate::repositories::patron::PatronQuery;
use crate::server::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 100;

/// Query parameters for patron listing and export
#[derive(Debug, Deserialize, Serialize, IntoParams, ToSchema)]
pub struct ListPatronsQuery {
    /// Optional campaign filter
    #[param(value_type = Option<String>)]
    pub campaign_id: Option<Uuid>,
    /// Free-text search over patron name and email
    pub search: Option<String>,
    /// Maximum number of patrons to return (default: 50, max: 100)
    pub limit: Option<i64>,
    /// Opaque cursor for pagination continuation
    pub cursor: Option<String>,
}

/// Patron information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PatronInfo {
    /// Unique identifier for the patron row
    #[schema(value_type = String)]
    pub id: Uuid,
    /// Campaign the patron belongs to
    #[schema(value_type = String)]
    pub campaign_id: Uuid,
    /// Patreon user id of the supporter
    pub external_user_id: String,
    /// Supporter display name
    pub full_name: String,
    /// Supporter email, when exposed
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
    /// Instant the relationship started (RFC 3339)
    pub pledge_start: Option<String>,
    /// Instant of the most recent charge attempt (RFC 3339)
    pub last_charge_date: Option<String>,
    /// Status of the most recent charge
    pub last_charge_status: Option<String>,
}

impl From<patron::Model> for PatronInfo {
    fn from(model: patron::Model) -> Self {
        Self {
            id: model.id,
            campaign_id: model.campaign_id,
            external_user_id: model.external_user_id,
            full_name: model.full_name,
            email: model.email,
            status: model.status,
            entitled_amount_cents: model.entitled_amount_cents,
            lifetime_support_cents: model.lifetime_support_cents,
            currency: model.currency,
            pledge_cap_reached: model.pledge_cap_reached,
            pledge_start: model
                .pledge_start
                .map(|dt| DateTime::<Utc>::from(dt).to_rfc3339()),
            last_charge_date: model
                .last_charge_date
                .map(|dt| DateTime::<Utc>::from(dt).to_rfc3339()),
            last_charge_status: model.last_charge_status,
        }
    }
}

/// Response wrapper for patron listings
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PatronsResponse {
    /// One page of patrons
    pub patrons: Vec<PatronInfo>,
    /// Opaque cursor for the next page (null on the last page)
    pub next_cursor: Option<String>,
}

fn build_query(query: &ListPatronsQuery) -> Result<PatronQuery, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED".to_string(),
            format!("limit must be between 1 and {}", MAX_LIMIT),
        ));
    }

    let cursor = query
        .cursor
        .as_deref()
        .map(decode_cursor)
        .transpose()?;

    Ok(PatronQuery {
        campaign_id: query.campaign_id,
        search: query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_string),
        cursor,
        limit: limit as u64,
    })
}

/// List patrons across the user's campaigns with cursor pagination
#[utoipa::path(
    get,
    path = "/patrons",
    security(("bearer_auth" = [])),
    params(ListPatronsQuery),
    responses(
        (status = 200, description = "One page of patrons", body = PatronsResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "patrons"
)]
pub async fn list_patrons(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListPatronsQuery>,
) -> Result<Json<PatronsResponse>, ApiError> {
    let patron_query = build_query(&query)?;
    let repo = PatronRepository::new(Arc::new(state.db.clone()));

    let (patrons, next) = repo.list_page(user.id, &patron_query).await?;
    let next_cursor = next.map(|data| encode_cursor(&data.created_at, &data.id));

    Ok(Json(PatronsResponse {
        patrons: patrons.into_iter().map(PatronInfo::from).collect(),
        next_cursor,
    }))
}

const CSV_HEADER: &str = "campaign_id,external_user_id,full_name,email,status,entitled_amount_cents,lifetime_support_cents,currency,pledge_cap_reached,pledge_start,last_charge_date,last_charge_status";

/// Quote a CSV field when it contains a delimiter, quote, or line break.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row(model: &patron::Model) -> String {
    let pledge_start = model
        .pledge_start
        .map(|dt| DateTime::<Utc>::from(dt).to_rfc3339())
        .unwrap_or_default();
    let last_charge_date = model
        .last_charge_date
        .map(|dt| DateTime::<Utc>::from(dt).to_rfc3339())
        .unwrap_or_default();

    [
        model.campaign_id.to_string(),
        csv_field(&model.external_user_id),
        csv_field(&model.full_name),
        csv_field(model.email.as_deref().unwrap_or("")),
        csv_field(&model.status),
        model.entitled_amount_cents.to_string(),
        model.lifetime_support_cents.to_string(),
        csv_field(&model.currency),
        model.pledge_cap_reached.to_string(),
        pledge_start,
        last_charge_date,
        csv_field(model.last_charge_status.as_deref().unwrap_or("")),
    ]
    .join(",")
}

/// Export matching patrons as CSV
#[utoipa::path(
    get,
    path = "/patrons/export",
    security(("bearer_auth" = [])),
    params(ListPatronsQuery),
    responses(
        (status = 200, description = "CSV document; header row always present", content_type = "text/csv"),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "patrons"
)]
pub async fn export_patrons(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListPatronsQuery>,
) -> Result<Response, ApiError> {
    // Limit and cursor do not apply to the export, but a present cursor is
    // still validated so malformed requests fail loudly.
    let patron_query = build_query(&ListPatronsQuery {
        limit: None,
        ..query
    })?;

    let repo = PatronRepository::new(Arc::new(state.db.clone()));
    let patrons = repo.list_all(user.id, &patron_query).await?;

    let mut body = String::with_capacity(64 + patrons.len() * 128);
    body.push_str(CSV_HEADER);
    body.push('\n');
    for model in &patrons {
        body.push_str(&csv_row(model));
        body.push('\n');
    }

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"patrons.csv\"",
            ),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sea_orm::prelude::DateTimeWithTimeZone;

    fn sample_patron() -> patron::Model {
        let at: DateTimeWithTimeZone = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap().into();
        patron::Model {
            id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            external_user_id: "9001".to_string(),
            full_name: "Doe, Jane \"JD\"".to_string(),
            email: Some("jane@example.com".to_string()),
            status: patron::STATUS_ACTIVE.to_string(),
            entitled_amount_cents: 500,
            lifetime_support_cents: 6000,
            currency: "USD".to_string(),
            pledge_cap_reached: false,
            pledge_start: None,
            last_charge_date: None,
            last_charge_status: Some("Paid".to_string()),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn csv_field_quotes_delimiters_and_quotes() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn csv_row_quotes_the_name_with_comma_and_quotes() {
        let row = csv_row(&sample_patron());
        assert!(row.contains("\"Doe, Jane \"\"JD\"\"\""));
        assert!(row.contains("jane@example.com"));
        assert!(row.ends_with(",Paid"));
    }

    #[test]
    fn header_column_count_matches_row_column_count() {
        let header_cols = CSV_HEADER.split(',').count();
        // The sample row has quoted commas, so count on a patron without them.
        let mut plain = sample_patron();
        plain.full_name = "Jane Doe".to_string();
        let row_cols = csv_row(&plain).split(',').count();
        assert_eq!(header_cols, row_cols);
    }

    #[test]
    fn limit_out_of_range_is_rejected() {
        let query = ListPatronsQuery {
            campaign_id: None,
            search: None,
            limit: Some(101),
            cursor: None,
        };
        let err = build_query(&query).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn blank_search_is_dropped() {
        let query = ListPatronsQuery {
            campaign_id: None,
            search: Some("   ".to_string()),
            limit: None,
            cursor: None,
        };
        let parsed = build_query(&query).unwrap();
        assert!(parsed.search.is_none());
        assert_eq!(parsed.limit, DEFAULT_LIMIT as u64);
    }
}
