//! # Patreon OAuth Handlers
//!
//! Authorize-URL issuance and the authorization-code callback. The callback
//! exchanges the code, stores the encrypted token pair on the connected
//! account, and imports the account's campaigns in the same request.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::patreon::mapping::map_campaign;
use crate::repositories::{CampaignRepository, ConnectedAccountRepository};
use crate::server::AppState;

/// Response carrying the Patreon authorize URL for the frontend redirect.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeResponse {
    /// Fully-formed Patreon OAuth authorize URL
    pub authorize_url: String,
    /// CSRF state embedded in the URL; the frontend must echo it back
    pub state: String,
}

/// Query parameters for the OAuth callback
#[derive(Debug, Deserialize, Serialize, IntoParams, ToSchema)]
pub struct CallbackQuery {
    /// Authorization code returned by Patreon
    pub code: String,
    /// CSRF state from the authorize step
    pub state: Option<String>,
}

/// Connected account summary returned after the callback.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CallbackResponse {
    /// Connected account id
    #[schema(value_type = String)]
    pub account_id: Uuid,
    /// Patreon display name of the connected creator
    pub display_name: String,
    /// Campaigns imported for the account
    pub campaigns: Vec<ImportedCampaign>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImportedCampaign {
    /// Campaign id
    #[schema(value_type = String)]
    pub id: Uuid,
    /// Patreon campaign id
    pub external_campaign_id: String,
    /// Campaign display name
    pub name: String,
}

/// Issue the Patreon authorize URL for the current user
#[utoipa::path(
    get,
    path = "/auth/patreon/authorize",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Authorize URL payload", body = AuthorizeResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn authorize(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<AuthorizeResponse>, ApiError> {
    let csrf_state = Uuid::new_v4().simple().to_string();
    let url = state.patreon.authorize_url(&csrf_state).map_err(|err| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "OAUTH_URL_FAILED".to_string(),
            format!("Failed to build authorize URL: {}", err),
        )
    })?;

    tracing::debug!(user_id = %user.id, "Issued Patreon authorize URL");

    Ok(Json(AuthorizeResponse {
        authorize_url: url.to_string(),
        state: csrf_state,
    }))
}

/// Complete the OAuth flow: exchange the code, connect the account, and
/// import its campaigns
#[utoipa::path(
    get,
    path = "/auth/patreon/callback",
    security(("bearer_auth" = [])),
    params(CallbackQuery),
    responses(
        (status = 200, description = "Account connected and campaigns imported", body = CallbackResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 502, description = "Patreon rejected the exchange", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn callback(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<CallbackResponse>, ApiError> {
    if query.code.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "code must not be empty",
        ));
    }

    let tokens = state
        .patreon
        .exchange_code(&query.code)
        .await
        .map_err(|err| crate::error::upstream_error(502, Some(err.to_string())))?;

    let identity = state
        .patreon
        .fetch_identity(&tokens.access_token)
        .await
        .map_err(|err| crate::error::upstream_error(502, Some(err.to_string())))?;

    let accounts =
        ConnectedAccountRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());
    let account = accounts.upsert_with_tokens(user.id, &identity, &tokens).await?;

    let campaign_repo = CampaignRepository::new(Arc::new(state.db.clone()));
    let document = state
        .patreon
        .fetch_campaigns(&tokens.access_token)
        .await
        .map_err(|err| crate::error::upstream_error(502, Some(err.to_string())))?;

    let mut imported = Vec::new();
    for resource in document.resources() {
        let model = map_campaign(account.id, resource)
            .map_err(|err| crate::error::upstream_error(502, Some(err.to_string())))?;
        let campaign = campaign_repo.upsert(model).await?;
        imported.push(ImportedCampaign {
            id: campaign.id,
            external_campaign_id: campaign.external_campaign_id,
            name: campaign.name,
        });
    }

    info!(
        user_id = %user.id,
        account_id = %account.id,
        campaigns = imported.len(),
        "Connected Patreon account"
    );

    Ok(Json(CallbackResponse {
        account_id: account.id,
        display_name: account.display_name,
        campaigns: imported,
    }))
}
