//! LINE HTTP surface
//!
//! LINE Login v2.1 is a pure authorization-code redirect flow; there is no
//! popup SDK, so the whole provider boundary is this client plus the
//! authorization endpoint the redirect flow navigates to.

use crate::error::{AuthError, ErrorKind};
use crate::models::Platform;
use crate::providers::traits::{ExchangedTokens, ProviderProfile, TokenExchangeApi};
use async_trait::async_trait;

pub const AUTHORIZE_ENDPOINT: &str = "https://access.line.me/oauth2/v2.1/authorize";
const TOKEN_ENDPOINT: &str = "https://api.line.me/oauth2/v2.1/token";
const PROFILE_ENDPOINT: &str = "https://api.line.me/v2/profile";
const REVOKE_ENDPOINT: &str = "https://api.line.me/oauth2/v2.1/revoke";

/// Token exchange / profile / revocation client for LINE Login
#[derive(Debug, Clone)]
pub struct LineTokenClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
}

impl LineTokenClient {
    #[must_use]
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
            client_secret,
        }
    }
}

#[async_trait]
impl TokenExchangeApi for LineTokenClient {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ExchangedTokens, AuthError> {
        let response = self
            .client
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::from_http(Platform::Line, &e))?;

        if !response.status().is_success() {
            return Err(AuthError::new(
                ErrorKind::InvalidToken,
                Platform::Line,
                format!("code exchange failed with status {}", response.status()),
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::from_http(Platform::Line, &e))?;

        let access_token = body
            .get("access_token")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                AuthError::new(
                    ErrorKind::InvalidToken,
                    Platform::Line,
                    "token response missing access_token",
                )
            })?;

        Ok(ExchangedTokens {
            access_token: access_token.to_string(),
            refresh_token: body
                .get("refresh_token")
                .and_then(serde_json::Value::as_str)
                .map(String::from),
            id_token: body
                .get("id_token")
                .and_then(serde_json::Value::as_str)
                .map(String::from),
            expires_in: body.get("expires_in").and_then(serde_json::Value::as_u64),
        })
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError> {
        let response = self
            .client
            .get(PROFILE_ENDPOINT)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::from_http(Platform::Line, &e))?;

        if !response.status().is_success() {
            return Err(AuthError::new(
                ErrorKind::ApiError,
                Platform::Line,
                format!("profile request failed with status {}", response.status()),
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::from_http(Platform::Line, &e))?;

        let id = body
            .get("userId")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                AuthError::new(
                    ErrorKind::ApiError,
                    Platform::Line,
                    "profile payload missing userId",
                )
            })?;

        Ok(ProviderProfile {
            id: id.to_string(),
            email: None,
            name: body
                .get("displayName")
                .and_then(serde_json::Value::as_str)
                .map(String::from),
            picture: body
                .get("pictureUrl")
                .and_then(serde_json::Value::as_str)
                .map(String::from),
        })
    }

    async fn revoke(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(REVOKE_ENDPOINT)
            .form(&[
                ("access_token", access_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::from_http(Platform::Line, &e))?;

        if !response.status().is_success() {
            return Err(AuthError::new(
                ErrorKind::ApiError,
                Platform::Line,
                format!("token revocation failed with status {}", response.status()),
            ));
        }
        Ok(())
    }
}
