//! SDK capability traits
//!
//! The flows depend only on these interfaces, never on an ambient SDK
//! namespace. Completion is modeled as a one-shot channel per request so a
//! provider callback settles exactly one flow generation, and stale
//! generations can be dropped.

use crate::error::{AuthError, SdkError};
use crate::models::Platform;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Lifecycle surface every provider SDK adapter implements
#[async_trait]
pub trait ProviderSdk: Send + Sync {
    fn platform(&self) -> Platform;

    /// Whether the SDK is loaded and initialized
    async fn is_ready(&self) -> bool;

    /// Load/initialize the SDK if it is not ready yet
    ///
    /// # Errors
    ///
    /// Returns `SDK_LOAD_FAILED` or `SDK_NOT_READY` class errors.
    async fn ensure_ready(&self) -> Result<(), AuthError>;

    /// Drop any cached SDK script and load it again
    ///
    /// # Errors
    ///
    /// Returns an error if the reload fails.
    async fn reload(&self) -> Result<(), AuthError>;

    /// Provider-local sign-out (revoke/disconnect), best effort
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the sign-out; callers treat
    /// this as non-fatal.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Liveness probe for a popup window the SDK opened
pub trait PopupProbe: Send + Sync {
    /// Whether the user closed the popup without the SDK callback firing
    fn is_closed(&self) -> bool;
}

/// Token delivered by a popup-mode SDK callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub access_token: String,
    pub expires_in: Option<u64>,
}

/// One in-flight popup credential request
///
/// The completion channel is owned by the requesting flow; dropping the
/// receiver discards a late SDK callback instead of delivering it anywhere.
pub struct PopupRequest {
    pub completion: oneshot::Receiver<Result<TokenPayload, SdkError>>,
    pub popup: Arc<dyn PopupProbe>,
}

/// Parameters for a popup token request
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub scopes: Vec<String>,
    pub nonce: String,
}

/// Token-popup style SDK (google)
#[async_trait]
pub trait PopupTokenSdk: ProviderSdk {
    /// Open the consent popup and request an access token
    ///
    /// # Errors
    ///
    /// Returns `POPUP_BLOCKED` if the popup could not be opened.
    async fn request_token(&self, request: TokenRequest) -> Result<PopupRequest, AuthError>;
}

/// In-app authorize-popup style SDK (kakao)
#[async_trait]
pub trait CredentialPopupSdk: ProviderSdk {
    /// Open the provider's authorize popup
    ///
    /// # Errors
    ///
    /// Returns `POPUP_BLOCKED` if the popup could not be opened.
    async fn authorize(&self, request: TokenRequest) -> Result<PopupRequest, AuthError>;
}

/// Signed payload delivered by the consent widget (telegram)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WidgetPayload {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub photo_url: Option<String>,
    /// Unix timestamp signed into the payload; stale payloads are rejected
    pub auth_date: i64,
    /// Authenticity marker (HMAC over the other fields); absent means forged
    /// or malformed
    pub hash: Option<String>,
}

/// Parameters for mounting the consent widget
#[derive(Debug, Clone)]
pub struct WidgetRequest {
    /// One-shot global callback name, unique per flow generation
    pub callback_name: String,
    pub size: Option<String>,
}

/// One mounted widget instance
pub struct WidgetSession {
    pub completion: oneshot::Receiver<Result<WidgetPayload, SdkError>>,
    pub callback_name: String,
}

/// Consent-widget style SDK (telegram)
#[async_trait]
pub trait WidgetSdk: ProviderSdk {
    /// Render the consent surface and register the one-shot callback
    ///
    /// # Errors
    ///
    /// Returns an error if the widget could not be mounted.
    async fn mount(&self, request: WidgetRequest) -> Result<WidgetSession, AuthError>;

    /// Tear down the rendered surface and the callback registration; called on
    /// every flow exit path and must be idempotent
    async fn unmount(&self);
}

/// Provider-agnostic profile shape returned by the profile endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Profile-fetch REST surface reachable with an obtained token
#[async_trait]
pub trait ProfileApi: Send + Sync {
    /// # Errors
    ///
    /// Returns `NETWORK_ERROR`/`API_ERROR` for transport or non-2xx failures;
    /// a malformed payload is a failure, never a partial success.
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError>;
}

/// Tokens obtained by exchanging an authorization code
#[derive(Debug, Clone)]
pub struct ExchangedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_in: Option<u64>,
}

/// Authorization-code exchange surface for redirect-mode providers
#[async_trait]
pub trait TokenExchangeApi: Send + Sync {
    /// # Errors
    ///
    /// Returns `NETWORK_ERROR`/`API_ERROR`/`INVALID_TOKEN` class errors.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ExchangedTokens, AuthError>;

    /// # Errors
    ///
    /// Same contract as [`ProfileApi::fetch_profile`].
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError>;

    /// # Errors
    ///
    /// Returns an error if the provider rejects the revocation.
    async fn revoke(&self, access_token: &str) -> Result<(), AuthError>;
}
