//! Popup-token login flow (google)
//!
//! Races three completion signals: the SDK callback delivering a token or an
//! error, the login timeout, and a single delayed liveness poll that catches
//! the user closing the popup without the SDK callback ever firing.

use crate::error::{AuthError, ErrorKind};
use crate::flows::{FlowCore, FlowOutcome, FlowState, LoginFlow, POPUP_CLOSE_CHECK_DELAY};
use crate::models::{
    AuthenticatedIdentity, FlowMode, LoginOptions, PendingFlowState, Platform,
};
use crate::providers::{PopupRequest, PopupTokenSdk, ProfileApi, TokenPayload};
use crate::utils::crypto::{generate_nonce, generate_state_token};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub struct PopupTokenFlow {
    core: FlowCore,
    sdk: Arc<dyn PopupTokenSdk>,
    profile: Arc<dyn ProfileApi>,
    default_scopes: Vec<String>,
    timeout: Duration,
}

impl PopupTokenFlow {
    #[must_use]
    pub fn new(
        sdk: Arc<dyn PopupTokenSdk>,
        profile: Arc<dyn ProfileApi>,
        default_scopes: Vec<String>,
        timeout: Duration,
    ) -> Self {
        let platform = sdk.platform();
        Self {
            core: FlowCore::new(platform),
            sdk,
            profile,
            default_scopes,
            timeout,
        }
    }

    fn scopes(&self, options: &LoginOptions) -> Vec<String> {
        let mut scopes = self.default_scopes.clone();
        for scope in &options.scopes {
            if !scopes.contains(scope) {
                scopes.push(scope.clone());
            }
        }
        scopes
    }

    /// Wait for whichever completion signal wins
    async fn await_completion(&self, request: PopupRequest) -> Result<TokenPayload, AuthError> {
        let platform = self.core.platform();
        let popup = Arc::clone(&request.popup);
        let closed_without_callback = async {
            tokio::time::sleep(POPUP_CLOSE_CHECK_DELAY).await;
            if popup.is_closed() {
                return;
            }
            std::future::pending::<()>().await;
        };

        tokio::select! {
            delivered = request.completion => match delivered {
                Ok(Ok(token)) => Ok(token),
                Ok(Err(sdk_error)) => Err(AuthError::from_sdk(platform, &sdk_error)),
                Err(_closed) => Err(AuthError::new(
                    ErrorKind::UnknownError,
                    platform,
                    "SDK dropped the completion callback without delivering a result",
                )),
            },
            () = closed_without_callback => Err(AuthError::new(
                ErrorKind::UserCancelled,
                platform,
                "popup closed before completing sign-in",
            )),
            () = tokio::time::sleep(self.timeout) => Err(AuthError::new(
                ErrorKind::TimeoutError,
                platform,
                format!("login timed out after {}s", self.timeout.as_secs()),
            )),
        }
    }

    async fn run(&self, options: &LoginOptions) -> Result<FlowOutcome, AuthError> {
        let platform = self.core.platform();
        self.sdk.ensure_ready().await?;

        let nonce = generate_nonce(32);
        self.core.store_pending(PendingFlowState::new(
            generate_state_token(),
            nonce.clone(),
            FlowMode::Popup,
            None,
        ));
        self.core.set_state(FlowState::PopupPending);

        let request = self
            .sdk
            .request_token(crate::providers::TokenRequest {
                scopes: self.scopes(options),
                nonce,
            })
            .await?;

        let token = self.await_completion(request).await?;
        if token.access_token.is_empty() {
            return Err(AuthError::new(
                ErrorKind::InvalidToken,
                platform,
                "SDK delivered an empty access token",
            ));
        }

        let profile = self.profile.fetch_profile(&token.access_token).await?;

        let mut identity =
            AuthenticatedIdentity::new(platform, profile.id, token.access_token);
        identity.email = profile.email;
        identity.display_name = profile.name;
        identity.avatar_url = profile.picture;
        Ok(FlowOutcome::Completed(identity))
    }
}

#[async_trait]
impl LoginFlow for PopupTokenFlow {
    fn platform(&self) -> Platform {
        self.core.platform()
    }

    fn state(&self) -> FlowState {
        self.core.state()
    }

    async fn ready(&self) -> bool {
        self.sdk.is_ready().await
    }

    async fn login(&self, options: &LoginOptions) -> Result<FlowOutcome, AuthError> {
        let generation = self.core.begin();
        let result = self.run(options).await;
        self.core.finish(generation, result)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.sdk.sign_out().await
    }
}
