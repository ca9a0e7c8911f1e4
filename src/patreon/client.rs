//! Patreon v2 API client
//!
//! Outbound HTTP to the Patreon OAuth and resource endpoints. Every resource
//! call passes explicit sparse fieldsets and uses cursor pagination. The
//! client is deliberately dumb about credentials: callers supply a bearer
//! token, and refresh/persistence policy lives with the token manager.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::AppConfig;
use crate::patreon::resource::Document;

const MEMBER_FIELDS: &str = "full_name,email,patron_status,currently_entitled_amount_cents,lifetime_support_cents,currency,pledge_relationship_start,last_charge_date,last_charge_status";
const USER_FIELDS: &str = "full_name,email";
const CAMPAIGN_FIELDS: &str = "creation_name,patron_count,currency,is_monthly";
const TIER_FIELDS: &str = "title,amount_cents,patron_count,published";
const GOAL_FIELDS: &str = "title,amount_cents,completed_percentage";
const POST_FIELDS: &str = "title,is_public,is_paid,like_count,comment_count,published_at,edited_at";

/// Patreon client errors
#[derive(Debug, Error)]
pub enum PatreonError {
    #[error("Patreon authentication failed (401)")]
    Unauthorized,

    #[error("Rate limited by Patreon API. Retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("Patreon API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("OAuth token exchange failed: {0}")]
    OAuth(String),

    #[error("Malformed Patreon response: {0}")]
    Malformed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

/// OAuth token grant response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// The authenticated Patreon user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub external_user_id: String,
    pub full_name: String,
    pub email: Option<String>,
}

/// Remote API surface, behind a trait so sync and handlers can be exercised
/// against fakes in tests.
#[async_trait]
pub trait PatreonApi: Send + Sync {
    /// Build the OAuth authorize URL for the given CSRF state.
    fn authorize_url(&self, state: &str) -> Result<Url, PatreonError>;

    /// Exchange an authorization code for a token pair.
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, PatreonError>;

    /// Refresh-token grant. Failure is a hard error.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, PatreonError>;

    /// Fetch the current user's identity.
    async fn fetch_identity(&self, access_token: &str) -> Result<Identity, PatreonError>;

    /// Fetch the campaigns owned by the authenticated creator.
    async fn fetch_campaigns(&self, access_token: &str) -> Result<Document, PatreonError>;

    /// Fetch one page of campaign members with the `user` include.
    async fn fetch_campaign_members(
        &self,
        access_token: &str,
        campaign_external_id: &str,
        cursor: Option<&str>,
    ) -> Result<Document, PatreonError>;

    /// Fetch one page of campaign posts.
    async fn fetch_campaign_posts(
        &self,
        access_token: &str,
        campaign_external_id: &str,
        cursor: Option<&str>,
    ) -> Result<Document, PatreonError>;
}

/// Reqwest-backed Patreon client.
#[derive(Clone)]
pub struct PatreonClient {
    http: reqwest::Client,
    oauth_base: String,
    api_base: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    page_size: u32,
}

impl PatreonClient {
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        oauth_base: String,
        api_base: String,
        page_size: u32,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            oauth_base,
            api_base,
            client_id,
            client_secret,
            redirect_uri,
            page_size,
        }
    }

    /// Build a client from application configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.patreon_client_id.clone().unwrap_or_default(),
            config.patreon_client_secret.clone().unwrap_or_default(),
            config.oauth_redirect_url.clone(),
            config.patreon_oauth_base.clone(),
            config.patreon_api_base.clone(),
            config.sync.page_size,
        )
    }

    async fn token_grant(
        &self,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, PatreonError> {
        let response = self
            .http
            .post(format!("{}/api/oauth2/token", self.oauth_base))
            .form(params)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(PatreonError::OAuth(format!(
                "grant failed: {} - {}",
                status, body
            )))
        }
    }

    async fn fetch_document(&self, url: Url, access_token: &str) -> Result<Document, PatreonError> {
        debug!(url = %url, "Fetching Patreon document");

        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header("User-Agent", "Patreonizer/0.1")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body)
                .map_err(|err| PatreonError::Malformed(format!("invalid JSON:API body: {}", err)))
        } else if status.as_u16() == 401 {
            warn!("Patreon API returned 401 Unauthorized");
            Err(PatreonError::Unauthorized)
        } else if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            warn!(retry_after, "Rate limited by Patreon API");
            Err(PatreonError::RateLimited { retry_after })
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(PatreonError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    fn paged_url(
        &self,
        path: &str,
        fields: &[(&str, &str)],
        include: Option<&str>,
        cursor: Option<&str>,
    ) -> Result<Url, PatreonError> {
        let mut url = Url::parse(&format!("{}{}", self.api_base, path))?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(include) = include {
                pairs.append_pair("include", include);
            }
            for (resource, list) in fields {
                pairs.append_pair(&format!("fields[{}]", resource), list);
            }
            pairs.append_pair("page[count]", &self.page_size.to_string());
            if let Some(cursor) = cursor {
                pairs.append_pair("page[cursor]", cursor);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl PatreonApi for PatreonClient {
    fn authorize_url(&self, state: &str) -> Result<Url, PatreonError> {
        let mut url = Url::parse(&format!("{}/oauth2/authorize", self.oauth_base))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("state", state)
            .append_pair(
                "scope",
                "identity campaigns campaigns.members campaigns.posts",
            );
        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, PatreonError> {
        self.token_grant(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", &self.redirect_uri),
        ])
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, PatreonError> {
        self.token_grant(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<Identity, PatreonError> {
        let mut url = Url::parse(&format!("{}/identity", self.api_base))?;
        url.query_pairs_mut()
            .append_pair("fields[user]", USER_FIELDS);

        let document = self.fetch_document(url, access_token).await?;
        let primary = document
            .primary()
            .ok_or_else(|| PatreonError::Malformed("identity missing primary data".to_string()))?;
        let attrs: crate::patreon::resource::UserAttributes = primary
            .attributes_as()
            .map_err(|err| PatreonError::Malformed(format!("identity attributes: {}", err)))?;

        Ok(Identity {
            external_user_id: primary.id.clone(),
            full_name: attrs.full_name.unwrap_or_default(),
            email: attrs.email,
        })
    }

    async fn fetch_campaigns(&self, access_token: &str) -> Result<Document, PatreonError> {
        let url = self.paged_url(
            "/campaigns",
            &[
                ("campaign", CAMPAIGN_FIELDS),
                ("tier", TIER_FIELDS),
                ("goal", GOAL_FIELDS),
            ],
            Some("tiers,goals"),
            None,
        )?;
        self.fetch_document(url, access_token).await
    }

    async fn fetch_campaign_members(
        &self,
        access_token: &str,
        campaign_external_id: &str,
        cursor: Option<&str>,
    ) -> Result<Document, PatreonError> {
        let url = self.paged_url(
            &format!("/campaigns/{}/members", campaign_external_id),
            &[("member", MEMBER_FIELDS), ("user", USER_FIELDS)],
            Some("user"),
            cursor,
        )?;
        self.fetch_document(url, access_token).await
    }

    async fn fetch_campaign_posts(
        &self,
        access_token: &str,
        campaign_external_id: &str,
        cursor: Option<&str>,
    ) -> Result<Document, PatreonError> {
        let url = self.paged_url(
            &format!("/campaigns/{}/posts", campaign_external_id),
            &[("post", POST_FIELDS)],
            None,
            cursor,
        )?;
        self.fetch_document(url, access_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> PatreonClient {
        PatreonClient::new(
            "client-id".to_string(),
            "client-secret".to_string(),
            "http://localhost:8080/auth/patreon/callback".to_string(),
            "https://www.patreon.com".to_string(),
            "https://www.patreon.com/api/oauth2/v2".to_string(),
            100,
        )
    }

    #[test]
    fn test_authorize_url_shape() {
        let client = test_client();
        let url = client.authorize_url("state-123").unwrap();

        assert_eq!(url.host_str(), Some("www.patreon.com"));
        assert_eq!(url.path(), "/oauth2/authorize");

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(pairs.get("client_id").map(|v| v.as_ref()), Some("client-id"));
        assert_eq!(pairs.get("state").map(|v| v.as_ref()), Some("state-123"));
        assert_eq!(
            pairs.get("response_type").map(|v| v.as_ref()),
            Some("code")
        );
        assert!(pairs.get("scope").unwrap().contains("campaigns.members"));
    }

    #[test]
    fn test_member_page_url_carries_fieldsets_and_cursor() {
        let client = test_client();
        let url = client
            .paged_url(
                "/campaigns/99/members",
                &[("member", MEMBER_FIELDS), ("user", USER_FIELDS)],
                Some("user"),
                Some("cursor-abc"),
            )
            .unwrap();

        let query = url.query().unwrap();
        assert!(query.contains("include=user"));
        assert!(query.contains("page%5Bcursor%5D=cursor-abc"));
        assert!(query.contains("fields%5Bmember%5D="));
        assert!(query.contains("fields%5Buser%5D="));
        assert!(query.contains("page%5Bcount%5D=100"));
    }

    #[test]
    fn test_campaign_page_url_inlines_tiers_and_goals() {
        let client = test_client();
        let url = client
            .paged_url(
                "/campaigns",
                &[
                    ("campaign", CAMPAIGN_FIELDS),
                    ("tier", TIER_FIELDS),
                    ("goal", GOAL_FIELDS),
                ],
                Some("tiers,goals"),
                None,
            )
            .unwrap();

        let query = url.query().unwrap();
        assert!(query.contains("include=tiers%2Cgoals"));
        assert!(query.contains("fields%5Btier%5D="));
        assert!(query.contains("fields%5Bgoal%5D="));
    }

    #[test]
    fn test_first_page_omits_cursor() {
        let client = test_client();
        let url = client
            .paged_url("/campaigns/99/posts", &[("post", POST_FIELDS)], None, None)
            .unwrap();
        assert!(!url.query().unwrap().contains("page%5Bcursor%5D"));
    }
}
