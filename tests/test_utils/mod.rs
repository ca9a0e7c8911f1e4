//! Test utilities for database and application testing.
//!
//! Provides in-memory SQLite setup with migrations, fixture seed helpers,
//! and a configurable fake Patreon API implementation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use url::Url;
use uuid::Uuid;

use patreonizer::config::AppConfig;
use patreonizer::crypto::CryptoKey;
use patreonizer::models::{campaign, connected_account, patron, user};
use patreonizer::patreon::resource::Document;
use patreonizer::patreon::{Identity, PatreonApi, PatreonError, TokenResponse};
use patreonizer::repositories::ConnectedAccountRepository;
use patreonizer::server::AppState;

pub const TEST_API_TOKEN: &str = "test-api-token-123";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        crypto_key: Some(vec![0u8; 32]),
        ..Default::default()
    }
}

pub fn test_crypto_key() -> CryptoKey {
    CryptoKey::new(vec![0u8; 32]).expect("test crypto key")
}

/// Build application state over the given database and fake API.
pub fn test_state(db: DatabaseConnection, api: Arc<dyn PatreonApi>) -> AppState {
    AppState::with_api(db, Arc::new(test_config()), api).expect("test app state")
}

#[allow(dead_code)]
pub async fn create_test_user(db: &DatabaseConnection, api_token: &str) -> Result<user::Model> {
    let now = Utc::now();
    Ok(user::ActiveModel {
        id: Set(Uuid::new_v4()),
        display_name: Set("Test Creator".to_string()),
        email: Set(Some("creator@example.com".to_string())),
        api_token: Set(api_token.to_string()),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(db)
    .await?)
}

/// Connect an account for the user with an encrypted token pair that
/// expires an hour from now.
#[allow(dead_code)]
pub async fn create_test_account(
    db: &DatabaseConnection,
    user_id: Uuid,
) -> Result<connected_account::Model> {
    let repo = ConnectedAccountRepository::new(Arc::new(db.clone()), test_crypto_key());
    let identity = Identity {
        external_user_id: format!("pat-user-{}", Uuid::new_v4().simple()),
        full_name: "Test Creator".to_string(),
        email: None,
    };
    let tokens = TokenResponse {
        access_token: "access-token-initial".to_string(),
        refresh_token: Some("refresh-token-initial".to_string()),
        expires_in: Some(3600),
    };
    repo.upsert_with_tokens(user_id, &identity, &tokens).await
}

#[allow(dead_code)]
pub async fn create_test_campaign(
    db: &DatabaseConnection,
    account_id: Uuid,
) -> Result<campaign::Model> {
    let now = Utc::now();
    Ok(campaign::ActiveModel {
        id: Set(Uuid::new_v4()),
        account_id: Set(account_id),
        external_campaign_id: Set(format!("camp-{}", Uuid::new_v4().simple())),
        name: Set("Test Campaign".to_string()),
        patron_count: Set(0),
        pledge_sum_cents: Set(0),
        currency: Set("USD".to_string()),
        last_synced_at: Set(None),
        is_active: Set(true),
        webhook_secret: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(db)
    .await?)
}

/// Insert a patron row directly. `offset_seconds` staggers created_at so
/// keyset pagination has a stable order.
#[allow(dead_code)]
pub async fn create_test_patron(
    db: &DatabaseConnection,
    campaign_id: Uuid,
    external_user_id: &str,
    full_name: &str,
    entitled_cents: i64,
    offset_seconds: i64,
) -> Result<patron::Model> {
    let at = Utc::now() - Duration::hours(1) + Duration::seconds(offset_seconds);
    Ok(patron::ActiveModel {
        id: Set(Uuid::new_v4()),
        campaign_id: Set(campaign_id),
        external_user_id: Set(external_user_id.to_string()),
        full_name: Set(full_name.to_string()),
        email: Set(Some(format!("{}@example.com", external_user_id))),
        status: Set(patron::STATUS_ACTIVE.to_string()),
        entitled_amount_cents: Set(entitled_cents),
        lifetime_support_cents: Set(entitled_cents * 10),
        currency: Set("USD".to_string()),
        pledge_cap_reached: Set(false),
        pledge_start: Set(None),
        last_charge_date: Set(None),
        last_charge_status: Set(Some("Paid".to_string())),
        created_at: Set(at.into()),
        updated_at: Set(at.into()),
    }
    .insert(db)
    .await?)
}

/// Build a JSON:API member page document.
#[allow(dead_code)]
pub fn member_page(members: &[(&str, &str, i64)], next_cursor: Option<&str>, total: u64) -> Document {
    let data: Vec<serde_json::Value> = members
        .iter()
        .map(|(user_id, name, cents)| {
            serde_json::json!({
                "id": format!("member-{}", user_id),
                "type": "member",
                "attributes": {
                    "full_name": name,
                    "patron_status": "active_patron",
                    "currently_entitled_amount_cents": cents,
                    "lifetime_support_cents": cents * 12,
                    "currency": "USD"
                },
                "relationships": {
                    "user": { "data": { "id": user_id, "type": "user" } }
                }
            })
        })
        .collect();

    let mut doc = serde_json::json!({
        "data": data,
        "meta": { "pagination": { "total": total, "cursors": {} } }
    });
    if let Some(cursor) = next_cursor {
        doc["meta"]["pagination"]["cursors"]["next"] = serde_json::json!(cursor);
    }
    serde_json::from_value(doc).expect("member page document")
}

/// Build a JSON:API post page document.
#[allow(dead_code)]
pub fn post_page(posts: &[(&str, &str)], next_cursor: Option<&str>, total: u64) -> Document {
    let data: Vec<serde_json::Value> = posts
        .iter()
        .map(|(id, title)| {
            serde_json::json!({
                "id": id,
                "type": "post",
                "attributes": {
                    "title": title,
                    "is_public": true,
                    "is_paid": false,
                    "like_count": 3,
                    "comment_count": 1
                }
            })
        })
        .collect();

    let mut doc = serde_json::json!({
        "data": data,
        "meta": { "pagination": { "total": total, "cursors": {} } }
    });
    if let Some(cursor) = next_cursor {
        doc["meta"]["pagination"]["cursors"]["next"] = serde_json::json!(cursor);
    }
    serde_json::from_value(doc).expect("post page document")
}

/// Configurable in-process Patreon API fake.
///
/// Member and post pages are keyed by cursor (None for the first page).
/// `fail_members` makes every member fetch fail; `reject_token` makes
/// fetches return 401 until a refresh rotates the access token.
#[derive(Default)]
pub struct FakePatreon {
    pub member_pages: Mutex<HashMap<Option<String>, Document>>,
    pub post_pages: Mutex<HashMap<Option<String>, Document>>,
    pub fail_members: std::sync::atomic::AtomicBool,
    pub reject_token: Mutex<Option<String>>,
    pub refresh_calls: AtomicUsize,
    pub member_fetches: AtomicUsize,
}

impl FakePatreon {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub async fn set_member_pages(&self, pages: Vec<(Option<&str>, Document)>) {
        let mut map = self.member_pages.lock().await;
        map.clear();
        for (cursor, doc) in pages {
            map.insert(cursor.map(str::to_string), doc);
        }
    }

    #[allow(dead_code)]
    pub async fn set_post_pages(&self, pages: Vec<(Option<&str>, Document)>) {
        let mut map = self.post_pages.lock().await;
        map.clear();
        for (cursor, doc) in pages {
            map.insert(cursor.map(str::to_string), doc);
        }
    }

    /// Make fetches with the given access token fail with 401 until a
    /// refresh happens.
    #[allow(dead_code)]
    pub async fn reject_access_token(&self, token: &str) {
        *self.reject_token.lock().await = Some(token.to_string());
    }

    fn empty_page() -> Document {
        serde_json::from_value(serde_json::json!({
            "data": [],
            "meta": { "pagination": { "total": 0, "cursors": {} } }
        }))
        .expect("empty document")
    }
}

#[async_trait]
impl PatreonApi for FakePatreon {
    fn authorize_url(&self, state: &str) -> Result<Url, PatreonError> {
        Ok(Url::parse(&format!(
            "https://www.patreon.com/oauth2/authorize?state={}",
            state
        ))?)
    }

    async fn exchange_code(&self, _code: &str) -> Result<TokenResponse, PatreonError> {
        Ok(TokenResponse {
            access_token: "access-token-initial".to_string(),
            refresh_token: Some("refresh-token-initial".to_string()),
            expires_in: Some(3600),
        })
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenResponse, PatreonError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.reject_token.lock().await = None;
        Ok(TokenResponse {
            access_token: "access-token-rotated".to_string(),
            refresh_token: Some("refresh-token-rotated".to_string()),
            expires_in: Some(3600),
        })
    }

    async fn fetch_identity(&self, _access_token: &str) -> Result<Identity, PatreonError> {
        Ok(Identity {
            external_user_id: "pat-user-1".to_string(),
            full_name: "Test Creator".to_string(),
            email: Some("creator@example.com".to_string()),
        })
    }

    async fn fetch_campaigns(&self, _access_token: &str) -> Result<Document, PatreonError> {
        serde_json::from_value(serde_json::json!({
            "data": [{
                "id": "camp-remote-1",
                "type": "campaign",
                "attributes": {
                    "creation_name": "Remote Campaign",
                    "patron_count": 0,
                    "currency": "USD",
                    "is_monthly": true
                }
            }]
        }))
        .map_err(|err| PatreonError::Malformed(err.to_string()))
    }

    async fn fetch_campaign_members(
        &self,
        access_token: &str,
        _campaign_external_id: &str,
        cursor: Option<&str>,
    ) -> Result<Document, PatreonError> {
        self.member_fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(rejected) = self.reject_token.lock().await.as_deref() {
            if rejected == access_token {
                return Err(PatreonError::Unauthorized);
            }
        }
        if self.fail_members.load(Ordering::SeqCst) {
            return Err(PatreonError::Api {
                status: 500,
                message: "simulated upstream failure".to_string(),
            });
        }

        let pages = self.member_pages.lock().await;
        Ok(pages
            .get(&cursor.map(str::to_string))
            .cloned()
            .unwrap_or_else(Self::empty_page))
    }

    async fn fetch_campaign_posts(
        &self,
        _access_token: &str,
        _campaign_external_id: &str,
        cursor: Option<&str>,
    ) -> Result<Document, PatreonError> {
        let pages = self.post_pages.lock().await;
        Ok(pages
            .get(&cursor.map(str::to_string))
            .cloned()
            .unwrap_or_else(Self::empty_page))
    }
}
