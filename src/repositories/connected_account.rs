//! Connected account repository
//!
//! Encapsulates SeaORM operations for the connected_accounts table,
//! including encrypt-before-write handling of the OAuth token pair.

use anyhow::{Result, anyhow};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{CryptoKey, decrypt_account_tokens, encrypt_account_tokens};
use crate::models::connected_account::{self, Entity as ConnectedAccount};
use crate::patreon::{Identity, TokenResponse};

/// Repository for connected account database operations
#[derive(Debug, Clone)]
pub struct ConnectedAccountRepository {
    pub db: Arc<DatabaseConnection>,
    pub crypto_key: CryptoKey,
}

impl ConnectedAccountRepository {
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Fetch an account by primary key.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<connected_account::Model>> {
        Ok(ConnectedAccount::find_by_id(id).one(self.db.as_ref()).await?)
    }

    /// Fetch an account only if it belongs to the given user.
    pub async fn get_owned(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<connected_account::Model>> {
        Ok(ConnectedAccount::find_by_id(id)
            .filter(connected_account::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await?)
    }

    /// All accounts connected by the given user, oldest first.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<connected_account::Model>> {
        Ok(ConnectedAccount::find()
            .filter(connected_account::Column::UserId.eq(user_id))
            .order_by_asc(connected_account::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    /// Create or update the account for (user, external user) with a fresh
    /// token pair. The tokens are encrypted with AAD binding them to the
    /// owning user before they touch the database.
    pub async fn upsert_with_tokens(
        &self,
        user_id: Uuid,
        identity: &Identity,
        tokens: &TokenResponse,
    ) -> Result<connected_account::Model> {
        let existing = ConnectedAccount::find()
            .filter(connected_account::Column::UserId.eq(user_id))
            .filter(connected_account::Column::ExternalUserId.eq(&identity.external_user_id))
            .one(self.db.as_ref())
            .await?;

        let now = Utc::now();
        let expires_at = tokens
            .expires_in
            .map(|seconds| (now + Duration::seconds(seconds)).into());

        match existing {
            Some(account) => {
                let (access_ct, refresh_ct) = encrypt_account_tokens(
                    &self.crypto_key,
                    &account,
                    Some(&tokens.access_token),
                    tokens.refresh_token.as_deref(),
                )
                .map_err(|e| anyhow!("Token encryption failed: {}", e))?;

                let mut active: connected_account::ActiveModel = account.into();
                active.display_name = Set(identity.full_name.clone());
                active.access_token_ciphertext = Set(access_ct);
                // Keep the previous refresh token if the grant omitted one
                if tokens.refresh_token.is_some() {
                    active.refresh_token_ciphertext = Set(refresh_ct);
                }
                active.token_expires_at = Set(expires_at);
                active.updated_at = Set(now.into());
                Ok(active.update(self.db.as_ref()).await?)
            }
            None => {
                // AAD only depends on user_id and external_user_id, so a
                // placeholder model is enough to encrypt before insert.
                let template = connected_account::Model {
                    id: Uuid::new_v4(),
                    user_id,
                    external_user_id: identity.external_user_id.clone(),
                    display_name: identity.full_name.clone(),
                    access_token_ciphertext: None,
                    refresh_token_ciphertext: None,
                    token_expires_at: None,
                    created_at: now.into(),
                    updated_at: now.into(),
                };

                let (access_ct, refresh_ct) = encrypt_account_tokens(
                    &self.crypto_key,
                    &template,
                    Some(&tokens.access_token),
                    tokens.refresh_token.as_deref(),
                )
                .map_err(|e| anyhow!("Token encryption failed: {}", e))?;

                let active = connected_account::ActiveModel {
                    id: Set(template.id),
                    user_id: Set(user_id),
                    external_user_id: Set(template.external_user_id.clone()),
                    display_name: Set(template.display_name.clone()),
                    access_token_ciphertext: Set(access_ct),
                    refresh_token_ciphertext: Set(refresh_ct),
                    token_expires_at: Set(expires_at),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                };
                Ok(active.insert(self.db.as_ref()).await?)
            }
        }
    }

    /// Persist a rotated token pair for an existing account. Called before
    /// any further remote request uses the new access token.
    pub async fn apply_token_refresh(
        &self,
        account_id: Uuid,
        tokens: &TokenResponse,
    ) -> Result<connected_account::Model> {
        let account = self
            .get_by_id(account_id)
            .await?
            .ok_or_else(|| anyhow!("Connected account '{}' not found", account_id))?;

        let (access_ct, refresh_ct) = encrypt_account_tokens(
            &self.crypto_key,
            &account,
            Some(&tokens.access_token),
            tokens.refresh_token.as_deref(),
        )
        .map_err(|e| anyhow!("Token encryption failed: {}", e))?;

        let now = Utc::now();
        let expires_at = tokens
            .expires_in
            .map(|seconds| (now + Duration::seconds(seconds)).into());

        let mut active: connected_account::ActiveModel = account.into();
        active.access_token_ciphertext = Set(access_ct);
        if tokens.refresh_token.is_some() {
            active.refresh_token_ciphertext = Set(refresh_ct);
        }
        active.token_expires_at = Set(expires_at);
        active.updated_at = Set(now.into());
        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Decrypt the stored token pair for an account.
    pub fn decrypt_tokens(
        &self,
        account: &connected_account::Model,
    ) -> Result<(Option<String>, Option<String>)> {
        decrypt_account_tokens(&self.crypto_key, account).map_err(|e| {
            tracing::error!(
                account_id = %account.id,
                external_user_id = %account.external_user_id,
                "Token decryption failed"
            );
            anyhow!("Token decryption failed: {}", e)
        })
    }

    /// Delete the account (campaigns and their children cascade). Returns
    /// whether a row was removed.
    pub async fn delete_owned(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        match self.get_owned(user_id, id).await? {
            Some(account) => {
                account.delete(self.db.as_ref()).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
