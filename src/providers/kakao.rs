//! Kakao HTTP surface
//!
//! Authorize-popup handling lives behind
//! [`crate::providers::CredentialPopupSdk`]; these are the token and user API
//! clients for the redirect fallback and profile fetch.

use crate::error::{AuthError, ErrorKind};
use crate::models::Platform;
use crate::providers::traits::{ExchangedTokens, ProfileApi, ProviderProfile, TokenExchangeApi};
use async_trait::async_trait;

pub const AUTHORIZE_ENDPOINT: &str = "https://kauth.kakao.com/oauth/authorize";
const TOKEN_ENDPOINT: &str = "https://kauth.kakao.com/oauth/token";
const USER_ME_ENDPOINT: &str = "https://kapi.kakao.com/v2/user/me";
const LOGOUT_ENDPOINT: &str = "https://kapi.kakao.com/v1/user/logout";

/// User API client for Kakao
#[derive(Debug, Clone, Default)]
pub struct KakaoApiClient {
    client: reqwest::Client,
}

impl KakaoApiClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate the user's Kakao session
    ///
    /// # Errors
    ///
    /// Returns `NETWORK_ERROR`/`API_ERROR` on transport or non-2xx failures.
    pub async fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(LOGOUT_ENDPOINT)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::from_http(Platform::Kakao, &e))?;

        if !response.status().is_success() {
            return Err(AuthError::new(
                ErrorKind::ApiError,
                Platform::Kakao,
                format!("logout failed with status {}", response.status()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileApi for KakaoApiClient {
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError> {
        let response = self
            .client
            .get(USER_ME_ENDPOINT)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::from_http(Platform::Kakao, &e))?;

        if !response.status().is_success() {
            return Err(AuthError::new(
                ErrorKind::ApiError,
                Platform::Kakao,
                format!("user/me request failed with status {}", response.status()),
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::from_http(Platform::Kakao, &e))?;

        let id = body.get("id").and_then(serde_json::Value::as_i64).ok_or_else(|| {
            AuthError::new(
                ErrorKind::ApiError,
                Platform::Kakao,
                "user/me payload missing id",
            )
        })?;

        let account = body.get("kakao_account");
        let profile = account.and_then(|a| a.get("profile"));

        Ok(ProviderProfile {
            id: id.to_string(),
            email: account
                .and_then(|a| a.get("email"))
                .and_then(serde_json::Value::as_str)
                .map(String::from),
            name: profile
                .and_then(|p| p.get("nickname"))
                .and_then(serde_json::Value::as_str)
                .map(String::from),
            picture: profile
                .and_then(|p| p.get("profile_image_url"))
                .and_then(serde_json::Value::as_str)
                .map(String::from),
        })
    }
}

/// Authorization-code exchange client for the Kakao redirect fallback
#[derive(Debug, Clone)]
pub struct KakaoTokenClient {
    client: reqwest::Client,
    api: KakaoApiClient,
    client_id: String,
    client_secret: Option<String>,
}

impl KakaoTokenClient {
    #[must_use]
    pub fn new(client_id: String, client_secret: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api: KakaoApiClient::new(),
            client_id,
            client_secret,
        }
    }
}

#[async_trait]
impl TokenExchangeApi for KakaoTokenClient {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ExchangedTokens, AuthError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("code", code),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .client
            .post(TOKEN_ENDPOINT)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::from_http(Platform::Kakao, &e))?;

        if !response.status().is_success() {
            return Err(AuthError::new(
                ErrorKind::InvalidToken,
                Platform::Kakao,
                format!("code exchange failed with status {}", response.status()),
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::from_http(Platform::Kakao, &e))?;

        let access_token = body
            .get("access_token")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                AuthError::new(
                    ErrorKind::InvalidToken,
                    Platform::Kakao,
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
        self.api.fetch_profile(access_token).await
    }

    async fn revoke(&self, access_token: &str) -> Result<(), AuthError> {
        self.api.logout(access_token).await
    }
}
