//! Google HTTP surface
//!
//! The popup half lives behind [`crate::providers::PopupTokenSdk`]; this is
//! the REST half reachable with the obtained token.

use crate::error::{AuthError, ErrorKind};
use crate::models::Platform;
use crate::providers::traits::{ProfileApi, ProviderProfile};
use async_trait::async_trait;

const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const REVOKE_ENDPOINT: &str = "https://oauth2.googleapis.com/revoke";

/// Userinfo/revocation client for Google
#[derive(Debug, Clone, Default)]
pub struct GoogleUserinfoClient {
    client: reqwest::Client,
}

impl GoogleUserinfoClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke an access token
    ///
    /// # Errors
    ///
    /// Returns `NETWORK_ERROR`/`API_ERROR` on transport or non-2xx failures.
    pub async fn revoke(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(REVOKE_ENDPOINT)
            .form(&[("token", access_token)])
            .send()
            .await
            .map_err(|e| AuthError::from_http(Platform::Google, &e))?;

        if !response.status().is_success() {
            return Err(AuthError::new(
                ErrorKind::ApiError,
                Platform::Google,
                format!("token revocation failed with status {}", response.status()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileApi for GoogleUserinfoClient {
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError> {
        let response = self
            .client
            .get(USERINFO_ENDPOINT)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::from_http(Platform::Google, &e))?;

        if !response.status().is_success() {
            return Err(AuthError::new(
                ErrorKind::ApiError,
                Platform::Google,
                format!("userinfo request failed with status {}", response.status()),
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::from_http(Platform::Google, &e))?;

        let id = body
            .get("sub")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                AuthError::new(
                    ErrorKind::ApiError,
                    Platform::Google,
                    "userinfo payload missing subject",
                )
            })?;

        Ok(ProviderProfile {
            id: id.to_string(),
            email: body.get("email").and_then(serde_json::Value::as_str).map(String::from),
            name: body.get("name").and_then(serde_json::Value::as_str).map(String::from),
            picture: body.get("picture").and_then(serde_json::Value::as_str).map(String::from),
        })
    }
}
