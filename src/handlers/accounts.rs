//! # Connected Account Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::repositories::ConnectedAccountRepository;
use crate::server::AppState;

/// Connected account information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccountInfo {
    /// Unique identifier for the account
    #[schema(value_type = String)]
    pub id: Uuid,
    /// Patreon user id of the connected creator
    pub external_user_id: String,
    /// Creator display name
    pub display_name: String,
    /// Whether an encrypted access token is stored
    pub has_access_token: bool,
    /// Whether an encrypted refresh token is stored
    pub has_refresh_token: bool,
    /// Access token expiry (RFC 3339)
    pub token_expires_at: Option<String>,
    /// Connection timestamp (RFC 3339)
    pub connected_at: String,
}

impl From<crate::models::connected_account::Model> for AccountInfo {
    fn from(model: crate::models::connected_account::Model) -> Self {
        Self {
            id: model.id,
            external_user_id: model.external_user_id,
            display_name: model.display_name,
            has_access_token: model.access_token_ciphertext.is_some(),
            has_refresh_token: model.refresh_token_ciphertext.is_some(),
            token_expires_at: model
                .token_expires_at
                .map(|dt| DateTime::<Utc>::from(dt).to_rfc3339()),
            connected_at: DateTime::<Utc>::from(model.created_at).to_rfc3339(),
        }
    }
}

/// Response wrapper for account listings
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccountsResponse {
    /// Accounts connected by the current user
    pub accounts: Vec<AccountInfo>,
}

/// List the current user's connected Patreon accounts
#[utoipa::path(
    get,
    path = "/accounts",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Connected accounts", body = AccountsResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "accounts"
)]
pub async fn list_accounts(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<AccountsResponse>, ApiError> {
    let repo =
        ConnectedAccountRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());
    let accounts = repo.list_for_user(user.id).await?;

    Ok(Json(AccountsResponse {
        accounts: accounts.into_iter().map(AccountInfo::from).collect(),
    }))
}

/// Disconnect a Patreon account, cascading to its campaigns and their data
#[utoipa::path(
    delete,
    path = "/accounts/{id}",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Connected account id")),
    responses(
        (status = 204, description = "Account disconnected"),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Account not found", body = ApiError)
    ),
    tag = "accounts"
)]
pub async fn disconnect_account(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let repo =
        ConnectedAccountRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());

    if !repo.delete_owned(user.id, id).await? {
        return Err(crate::error::not_found("Connected account not found"));
    }

    info!(user_id = %user.id, account_id = %id, "Disconnected Patreon account");
    Ok(StatusCode::NO_CONTENT)
}
