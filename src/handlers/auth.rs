use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::Deserialize;

use crate::{app_state::AppState, error::LedgerError};

pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Proof that the request carried the configured admin key.
#[derive(Debug, Clone, Copy)]
pub struct AdminKey;

impl FromRequestParts<AppState> for AdminKey {
    type Rejection = LedgerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin_api_key.as_deref() else {
            return Err(LedgerError::Forbidden);
        };

        let provided = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(LedgerError::Unauthorized)?;

        if provided != expected {
            tracing::warn!(path = %parts.uri.path(), "rejected admin request with wrong key");
            return Err(LedgerError::Unauthorized);
        }

        Ok(AdminKey)
    }
}

#[derive(Debug, Deserialize)]
struct WebhookQuery {
    key: Option<String>,
}

/// Gate for the payment webhook. The host posts without custom headers, so
/// the webhook secret is accepted from the `key` query parameter. Operators
/// can still call it with the admin header.
#[derive(Debug, Clone, Copy)]
pub struct WebhookKey;

impl FromRequestParts<AppState> for WebhookKey {
    type Rejection = LedgerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secret = state.config.webhook_secret.as_deref();
        let provided = Query::<WebhookQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.key);

        if let (Some(secret), Some(provided)) = (secret, provided.as_deref()) {
            if provided == secret {
                return Ok(WebhookKey);
            }
            tracing::warn!("rejected payment webhook with wrong key");
            return Err(LedgerError::Unauthorized);
        }

        match AdminKey::from_request_parts(parts, state).await {
            Ok(AdminKey) => Ok(WebhookKey),
            Err(LedgerError::Forbidden) if secret.is_some() => Err(LedgerError::Unauthorized),
            Err(e) => Err(e),
        }
    }
}
