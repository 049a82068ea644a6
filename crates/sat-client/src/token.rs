//! # Shared Access Token
//!
//! The protocol core treats an [`AccessToken`] as an immutable value per
//! call. When several tasks share one token, renewal must happen once:
//! [`TokenCache`] keeps the current token behind a `tokio::sync::Mutex`
//! and re-checks expiry while holding it, so callers that queue behind a
//! refresh reuse the token it produced instead of authenticating again.

use chrono::{Duration, Utc};
use sat_core::AccessToken;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::client::SatClient;
use crate::error::ClientError;

/// Current token plus the single refresh point for it.
#[derive(Debug)]
pub struct TokenCache {
    current: Mutex<Option<AccessToken>>,
    refresh_margin: Duration,
}

impl TokenCache {
    /// Tokens within `refresh_margin` of expiry are renewed.
    pub fn new(refresh_margin: Duration) -> Self {
        Self {
            current: Mutex::new(None),
            refresh_margin,
        }
    }

    /// A usable token, authenticating first when none is held or the held
    /// one is about to expire.
    pub async fn get(
        &self,
        client: &SatClient,
        cancel: &CancellationToken,
    ) -> Result<AccessToken, ClientError> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref() {
            if !token.is_expired_at(Utc::now(), self.refresh_margin) {
                return Ok(token.clone());
            }
            tracing::info!(expired_at = %token.expires(), "access token expired, re-authenticating");
        }
        let fresh = client.authenticate(cancel).await?;
        *current = Some(fresh.clone());
        Ok(fresh)
    }

    /// Authenticate unconditionally and hold the new token.
    pub async fn renew(
        &self,
        client: &SatClient,
        cancel: &CancellationToken,
    ) -> Result<AccessToken, ClientError> {
        let mut current = self.current.lock().await;
        let fresh = client.authenticate(cancel).await?;
        *current = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drop the held token; the next [`get`](Self::get) authenticates.
    pub async fn clear(&self) {
        *self.current.lock().await = None;
    }

    pub async fn current(&self) -> Option<AccessToken> {
        self.current.lock().await.clone()
    }
}
