//! Credential-popup login flow (kakao)
//!
//! Popup mode by default; falls back to the shared redirect machinery when the
//! caller opted out of popups or the browser blocked the popup.

use crate::error::{AuthError, ErrorKind};
use crate::flows::redirect::{
    matches_callback, parse_callback, strip_callback_params, validate_callback,
};
use crate::flows::{FlowCore, FlowOutcome, FlowState, LoginFlow, POPUP_CLOSE_CHECK_DELAY};
use crate::models::{
    AuthenticatedIdentity, FlowMode, LoginOptions, PendingFlowState, Platform,
};
use crate::providers::{kakao, PopupRequest, CredentialPopupSdk, ProfileApi, TokenExchangeApi};
use crate::runtime::{token_cache_key, Navigator, StateStore};
use crate::utils::crypto::generate_state_token;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub struct CredentialPopupFlow {
    core: FlowCore,
    sdk: Arc<dyn CredentialPopupSdk>,
    profile: Arc<dyn ProfileApi>,
    tokens: Arc<dyn TokenExchangeApi>,
    navigator: Arc<dyn Navigator>,
    store: Arc<dyn StateStore>,
    client_id: String,
    redirect_uri: String,
    default_scopes: Vec<String>,
    timeout: Duration,
}

impl CredentialPopupFlow {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        sdk: Arc<dyn CredentialPopupSdk>,
        profile: Arc<dyn ProfileApi>,
        tokens: Arc<dyn TokenExchangeApi>,
        navigator: Arc<dyn Navigator>,
        store: Arc<dyn StateStore>,
        client_id: String,
        redirect_uri: String,
        default_scopes: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            core: FlowCore::new(Platform::Kakao),
            sdk,
            profile,
            tokens,
            navigator,
            store,
            client_id,
            redirect_uri,
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

    async fn run_popup(&self, options: &LoginOptions) -> Result<FlowOutcome, AuthError> {
        self.sdk.ensure_ready().await?;

        let state = generate_state_token();
        self.core.store_pending(PendingFlowState::new(
            state.clone(),
            String::new(),
            FlowMode::Popup,
            None,
        ));
        self.core.set_state(FlowState::PopupPending);

        let request = self
            .sdk
            .authorize(crate::providers::TokenRequest {
                scopes: self.scopes(options),
                nonce: state,
            })
            .await?;

        let token = self.await_completion(request).await?;
        let profile = self.profile.fetch_profile(&token.access_token).await?;

        let mut identity =
            AuthenticatedIdentity::new(Platform::Kakao, profile.id.clone(), token.access_token);
        identity.email = profile.email;
        identity.display_name = profile.name;
        identity.avatar_url = profile.picture;
        identity.numeric_id = profile.id.parse().ok();
        Ok(FlowOutcome::Completed(identity))
    }

    async fn await_completion(
        &self,
        request: PopupRequest,
    ) -> Result<crate::providers::TokenPayload, AuthError> {
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
                Ok(Err(sdk_error)) => Err(AuthError::from_sdk(Platform::Kakao, &sdk_error)),
                Err(_closed) => Err(AuthError::new(
                    ErrorKind::UnknownError,
                    Platform::Kakao,
                    "SDK dropped the completion callback without delivering a result",
                )),
            },
            () = closed_without_callback => Err(AuthError::new(
                ErrorKind::UserCancelled,
                Platform::Kakao,
                "popup closed before completing sign-in",
            )),
            () = tokio::time::sleep(self.timeout) => Err(AuthError::new(
                ErrorKind::TimeoutError,
                Platform::Kakao,
                format!("login timed out after {}s", self.timeout.as_secs()),
            )),
        }
    }

    fn start_redirect(&self, options: &LoginOptions) -> Result<FlowOutcome, AuthError> {
        let state = generate_state_token();
        let redirect_uri = options
            .redirect_uri
            .clone()
            .unwrap_or_else(|| self.redirect_uri.clone());

        let pending = PendingFlowState::new(
            state.clone(),
            String::new(),
            FlowMode::Redirect,
            Some(redirect_uri.clone()),
        );
        pending.persist(self.store.as_ref(), Platform::Kakao).map_err(|e| {
            AuthError::new(
                ErrorKind::UnknownError,
                Platform::Kakao,
                format!("failed to persist pending login: {e}"),
            )
        })?;

        let mut url = Url::parse(kakao::AUTHORIZE_ENDPOINT).map_err(|e| {
            AuthError::new(ErrorKind::InvalidConfig, Platform::Kakao, e.to_string())
        })?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &redirect_uri)
                .append_pair("state", &state);
            let scopes = self.scopes(options);
            if !scopes.is_empty() {
                query.append_pair("scope", &scopes.join(" "));
            }
        }

        log::info!("[kakao] redirecting to authorization endpoint");
        self.core.set_state(FlowState::Redirecting);
        self.navigator.assign(url);
        Ok(FlowOutcome::RedirectPending)
    }

    async fn run(&self, options: &LoginOptions) -> Result<FlowOutcome, AuthError> {
        if !options.prefer_popup {
            return self.start_redirect(options);
        }
        match self.run_popup(options).await {
            Err(error) if error.kind == ErrorKind::PopupBlocked => {
                log::info!("[kakao] popup blocked, falling back to redirect mode");
                self.start_redirect(options)
            }
            other => other,
        }
    }

    async fn complete(&self) -> Result<FlowOutcome, AuthError> {
        let url = self.navigator.current_url();
        let params = parse_callback(&url);
        let pending = PendingFlowState::take(self.store.as_ref(), Platform::Kakao);

        let (code, pending) = validate_callback(Platform::Kakao, &params, pending)?;
        let redirect_uri = pending
            .redirect_uri
            .clone()
            .unwrap_or_else(|| self.redirect_uri.clone());

        let tokens = self.tokens.exchange_code(&code, &redirect_uri).await?;
        let profile = self.tokens.fetch_profile(&tokens.access_token).await?;

        let mut identity =
            AuthenticatedIdentity::new(Platform::Kakao, profile.id.clone(), tokens.access_token);
        identity.email = profile.email;
        identity.display_name = profile.name;
        identity.avatar_url = profile.picture;
        identity.refresh_token = tokens.refresh_token;
        identity.numeric_id = profile.id.parse().ok();
        Ok(FlowOutcome::Completed(identity))
    }
}

#[async_trait]
impl LoginFlow for CredentialPopupFlow {
    fn platform(&self) -> Platform {
        Platform::Kakao
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
        if matches!(result, Ok(FlowOutcome::RedirectPending)) {
            // pending state lives in the store across the navigation
            if self.core.is_current(generation) {
                return result;
            }
            return Err(AuthError::stale(Platform::Kakao));
        }
        self.core.finish(generation, result)
    }

    fn is_callback_url(&self, url: &Url) -> bool {
        matches_callback(Platform::Kakao, url, self.store.as_ref())
    }

    async fn handle_redirect_callback(&self) -> Result<FlowOutcome, AuthError> {
        let result = self.complete().await;
        strip_callback_params(self.navigator.as_ref());
        match &result {
            Ok(_) => self.core.set_state(FlowState::Completed),
            Err(error) if error.kind == ErrorKind::UserCancelled => {
                self.core.set_state(FlowState::Cancelled);
            }
            Err(_) => self.core.set_state(FlowState::Failed),
        }
        result
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.store.remove(&token_cache_key(Platform::Kakao));
        self.sdk.sign_out().await
    }
}
