//! # Authentication
//!
//! This module provides per-user API token bearer authentication for
//! protected endpoints. Tokens are looked up in the `users` table and the
//! resolved user is attached to the request as [`CurrentUser`].

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized};
use crate::models::user;
use crate::server::AppState;

/// Authenticated user resolved from the bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: Uuid,
    pub display_name: String,
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

impl FromRef<AppState> for DatabaseConnection {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.db.clone()
    }
}

/// Authentication middleware that resolves bearer API tokens to users.
pub async fn auth_middleware(
    State(db): State<DatabaseConnection>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers().clone();

    let token = extract_bearer_token(&headers)?;
    let current_user = resolve_user(&db, token).await?;

    tracing::debug!(user_id = %current_user.id, "Authenticated request");

    let mut request = request;
    request.extensions_mut().insert(current_user);

    Ok(next.run(request).await)
}

/// Extract the bearer token from the Authorization header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))
        .and_then(|value| {
            value
                .to_str()
                .map_err(|_| unauthorized(Some("Invalid Authorization header")))
        })
        .and_then(|header| {
            header
                .strip_prefix("Bearer ")
                .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
        })
}

async fn resolve_user(db: &DatabaseConnection, token: &str) -> Result<CurrentUser, ApiError> {
    if token.is_empty() {
        return Err(unauthorized(Some("Invalid bearer token")));
    }

    let record = user::Entity::find()
        .filter(user::Column::ApiToken.eq(token))
        .one(db)
        .await?;

    match record {
        // The indexed lookup already matched; the constant-time compare guards
        // against collation-insensitive backends treating distinct tokens as equal.
        Some(found) if bool::from(found.api_token.as_bytes().ct_eq(token.as_bytes())) => {
            Ok(CurrentUser {
                id: found.id,
                display_name: found.display_name,
            })
        }
        _ => Err(unauthorized(Some("Invalid bearer token"))),
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    DatabaseConnection: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| unauthorized(Some("Authentication required")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn missing_auth_header_is_rejected() {
        let headers = HeaderMap::new();
        let err = extract_bearer_token(&headers).unwrap_err();
        assert_eq!(err.code, "UNAUTHORIZED".into());
        assert!(err.message.contains("Missing Authorization header"));
    }

    #[test]
    fn non_bearer_scheme_is_rejected() {
        let headers = headers_with_auth("Basic dGVzdDoxMjM=");
        let err = extract_bearer_token(&headers).unwrap_err();
        assert_eq!(err.code, "UNAUTHORIZED".into());
        assert!(err.message.contains("Bearer scheme"));
    }

    #[test]
    fn bearer_token_is_extracted() {
        let headers = headers_with_auth("Bearer tok-abc123");
        assert_eq!(extract_bearer_token(&headers).unwrap(), "tok-abc123");
    }
}
