//! Bearer-token requests with a single refresh-and-retry
//!
//! Tokens are persisted through the key-value store. When a request comes
//! back 401 the client refreshes once, saves the new tokens and replays
//! the request; a second 401 is handed back to the caller as-is.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::store::{KeyValueStore, StoreError};

/// Store key for persisted tokens
pub const TOKENS_KEY: &str = "auth_tokens";

/// Auth error types
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Token refresh rejected (HTTP {0})")]
    RefreshRejected(u16),

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Token storage failed: {0}")]
    Storage(#[from] StoreError),
}

/// Persisted OAuth token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry as unix seconds, if the provider reported one
    #[serde(default)]
    pub expires_at: Option<u64>,
}

impl AuthTokens {
    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        self.expires_at.map(|t| now_secs >= t).unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// =============================================================================
// Token Vault
// =============================================================================

/// Persists tokens under one store key, one writer at a time
pub struct TokenVault {
    store: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl TokenVault {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn load(&self) -> Result<Option<AuthTokens>, AuthError> {
        match self.store.get_item(TOKENS_KEY).await? {
            Some(json) => {
                let tokens = serde_json::from_str(&json).map_err(StoreError::from)?;
                Ok(Some(tokens))
            }
            None => Ok(None),
        }
    }

    pub async fn save(&self, tokens: &AuthTokens) -> Result<(), AuthError> {
        let json = serde_json::to_string(tokens).map_err(StoreError::from)?;
        let _guard = self.write_lock.lock().await;
        self.store.set_item(TOKENS_KEY, &json).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().await;
        self.store.delete_item(TOKENS_KEY).await?;
        Ok(())
    }
}

// =============================================================================
// Refreshers
// =============================================================================

/// Exchanges a refresh token for a new token pair
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, AuthError>;
}

/// Standard `refresh_token` grant against an OAuth token endpoint
pub struct OAuthRefresher {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: Option<u64>,
    created_at: Option<u64>,
}

impl TokenResponse {
    fn into_tokens(self) -> AuthTokens {
        let issued = self.created_at.unwrap_or_else(unix_now);
        AuthTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_in.map(|secs| issued + secs),
        }
    }
}

impl OAuthRefresher {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .json(&RefreshRequest {
                refresh_token,
                client_id: &self.client_id,
                client_secret: &self.client_secret,
                grant_type: "refresh_token",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::RefreshRejected(status.as_u16()));
        }

        let body = response.text().await?;
        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::InvalidResponse(format!("JSON parse error: {}", e)))?;
        Ok(parsed.into_tokens())
    }
}

// =============================================================================
// Authorized Client
// =============================================================================

/// HTTP client that attaches bearer tokens and refreshes once on 401
pub struct AuthorizedClient {
    client: reqwest::Client,
    vault: TokenVault,
    refresher: Arc<dyn TokenRefresher>,
    refresh_lock: Mutex<()>,
}

impl AuthorizedClient {
    pub fn new(vault: TokenVault, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            client: reqwest::Client::new(),
            vault,
            refresher,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn vault(&self) -> &TokenVault {
        &self.vault
    }

    /// Store tokens obtained from a completed sign-in
    pub async fn sign_in(&self, tokens: &AuthTokens) -> Result<(), AuthError> {
        self.vault.save(tokens).await
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.vault.clear().await
    }

    /// Send the request produced by `build` with the current access token.
    ///
    /// Tokens already past `expires_at` are refreshed before sending.
    /// Otherwise a 401 triggers the refresh and `build` runs a second time.
    /// Either way there is at most one refresh per call.
    pub async fn send<F>(&self, build: F) -> Result<reqwest::Response, AuthError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let mut tokens = self.vault.load().await?.ok_or(AuthError::NotAuthenticated)?;

        let refreshed = tokens.is_expired();
        if refreshed {
            info!("Access token expired, refreshing");
            tokens = self.refresh(&tokens).await?;
        }

        let response = build(&self.client)
            .bearer_auth(&tokens.access_token)
            .send()
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        if refreshed {
            warn!("Freshly refreshed token was rejected");
            return Ok(response);
        }

        info!("Access token rejected, refreshing");
        let fresh = self.refresh(&tokens).await?;

        let retry = build(&self.client)
            .bearer_auth(&fresh.access_token)
            .send()
            .await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            warn!("Request still unauthorized after refresh");
        }
        Ok(retry)
    }

    async fn refresh(&self, stale: &AuthTokens) -> Result<AuthTokens, AuthError> {
        let _guard = self.refresh_lock.lock().await;

        // A concurrent caller may already have replaced the stale token
        if let Some(current) = self.vault.load().await? {
            if current.access_token != stale.access_token {
                debug!("Using tokens refreshed by another request");
                return Ok(current);
            }
        }

        let fresh = self.refresher.refresh(&stale.refresh_token).await?;
        self.vault.save(&fresh).await?;
        Ok(fresh)
    }
}
