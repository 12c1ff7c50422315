//! OAuth2 authorization-code flow with PKCE for the upstream identity.
//!
//! Anthropic's OAuth implementation deviates from the RFC in a few ways:
//! the token exchange is JSON-encoded (not form-encoded) and carries a
//! non-standard `state` field, and authorization codes come back in
//! `code#state` form.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use super::storage::{CredentialStore, Credentials};
use crate::error::RelayError;
use crate::upstream::TokenProvider;

const CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";
const AUTHORIZE_URL: &str = "https://claude.ai/oauth/authorize";
const TOKEN_URL: &str = "https://console.anthropic.com/v1/oauth/token";
const REDIRECT_URI: &str = "https://console.anthropic.com/oauth/code/callback";
const SCOPES: &str = "org:create_api_key user:profile user:inference";

/// Refresh when the access token is within this margin of expiry.
const REFRESH_MARGIN_MS: u64 = 60_000;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
}

pub struct OAuthManager {
    client: Client,
    verifier: RwLock<Option<String>>,
    /// Serializes refreshes so concurrent requests don't race the
    /// single-use refresh token.
    refresh_lock: Mutex<()>,
    store: Arc<CredentialStore>,
}

impl OAuthManager {
    pub fn new(client: Client, store: Arc<CredentialStore>) -> Self {
        Self {
            client,
            verifier: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            store,
        }
    }

    fn generate_verifier() -> String {
        let mut rng = rand::rng();
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn generate_challenge(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// Begin the PKCE flow; returns the URL the user must open.
    /// The verifier doubles as the OAuth state parameter.
    pub async fn start_flow(&self) -> String {
        let verifier = Self::generate_verifier();
        let challenge = Self::generate_challenge(&verifier);

        *self.verifier.write().await = Some(verifier.clone());

        format!(
            "{}?code=true&client_id={}&response_type=code&redirect_uri={}&scope={}&code_challenge={}&code_challenge_method=S256&state={}",
            AUTHORIZE_URL,
            CLIENT_ID,
            urlencoding::encode(REDIRECT_URI),
            urlencoding::encode(SCOPES),
            challenge,
            verifier
        )
    }

    /// Exchange the pasted `code#state` for tokens and persist them.
    pub async fn exchange_code(&self, code: &str) -> Result<(), RelayError> {
        let verifier = self
            .verifier
            .read()
            .await
            .clone()
            .ok_or_else(|| RelayError::OAuth("no OAuth flow in progress".to_string()))?;

        let (actual_code, state) = code.split_once('#').unwrap_or((code, ""));

        let body = serde_json::json!({
            "code": actual_code,
            "state": state,
            "grant_type": "authorization_code",
            "client_id": CLIENT_ID,
            "redirect_uri": REDIRECT_URI,
            "code_verifier": verifier,
        });

        let response = self
            .client
            .post(TOKEN_URL)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::OAuth(format!("failed to exchange code: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RelayError::OAuth(format!(
                "token exchange failed ({status}): {text}"
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| RelayError::OAuth(format!("failed to parse token response: {e}")))?;

        self.store
            .set(Credentials {
                access_token: token.access_token,
                refresh_token: token.refresh_token,
                expires_at: now_millis() + token.expires_in * 1000,
            })
            .await
            .map_err(|e| RelayError::OAuth(format!("failed to save credentials: {e}")))?;

        *self.verifier.write().await = None;

        Ok(())
    }

    /// Return a usable access token, refreshing first when the stored one
    /// is expired or about to expire. `None` means no credentials exist.
    pub async fn refresh_if_needed(&self) -> Result<Option<String>, RelayError> {
        let Some(credentials) = self.store.get().await else {
            return Ok(None);
        };

        if now_millis() + REFRESH_MARGIN_MS < credentials.expires_at {
            return Ok(Some(credentials.access_token));
        }

        let _guard = self.refresh_lock.lock().await;

        // Another request may have refreshed while we waited for the lock
        let Some(credentials) = self.store.get().await else {
            return Ok(None);
        };
        if now_millis() + REFRESH_MARGIN_MS < credentials.expires_at {
            return Ok(Some(credentials.access_token));
        }

        self.refresh(credentials.refresh_token).await
    }

    async fn refresh(&self, refresh_token: String) -> Result<Option<String>, RelayError> {
        let body = serde_json::json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
            "client_id": CLIENT_ID,
        });

        let response = self
            .client
            .post(TOKEN_URL)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::OAuth(format!("failed to refresh token: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            // A rotated or revoked refresh token never recovers; drop the
            // stale credentials instead of failing every request.
            if text.contains("invalid_grant") {
                warn!("OAuth refresh token is invalid, clearing stale credentials");
                let _ = self.store.clear().await;
                return Ok(None);
            }

            return Err(RelayError::OAuth(format!(
                "token refresh failed ({status}): {text}"
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| RelayError::OAuth(format!("failed to parse refresh response: {e}")))?;

        let access_token = token.access_token.clone();
        self.store
            .set(Credentials {
                access_token: token.access_token,
                refresh_token: token.refresh_token,
                expires_at: now_millis() + token.expires_in * 1000,
            })
            .await
            .map_err(|e| RelayError::OAuth(format!("failed to save refreshed credentials: {e}")))?;

        Ok(Some(access_token))
    }

    pub async fn logout(&self) -> Result<(), std::io::Error> {
        *self.verifier.write().await = None;
        self.store.clear().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.store.is_configured().await
    }
}

#[async_trait]
impl TokenProvider for OAuthManager {
    async fn bearer_token(&self) -> Result<String, RelayError> {
        match self.refresh_if_needed().await? {
            Some(token) => Ok(token),
            None => Err(RelayError::MissingCredentials),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}
