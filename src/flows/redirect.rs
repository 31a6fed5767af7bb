//! Redirect-code login flow (LINE), plus the callback machinery shared with
//! the kakao redirect fallback
//!
//! The initiating call persists the pending state through the navigation,
//! navigates away, and returns `RedirectPending`; resumption happens through
//! `handle_redirect_callback` on the next load. Whatever the outcome, the
//! stored pending state is consumed and the sensitive query parameters are
//! stripped from the visible URL so back-navigation cannot replay them.

use crate::error::{classify_provider_code, AuthError, ErrorKind};
use crate::flows::{FlowCore, FlowOutcome, FlowState, LoginFlow};
use crate::models::{
    AuthenticatedIdentity, FlowMode, LoginOptions, PendingFlowState, Platform,
};
use crate::providers::{line, TokenExchangeApi};
use crate::runtime::{token_cache_key, Navigator, StateStore};
use crate::utils::crypto::{generate_nonce, generate_state_token};
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

/// Query parameters a provider callback may carry
#[derive(Debug, Clone, Default)]
pub(crate) struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub(crate) fn parse_callback(url: &Url) -> CallbackParams {
    let mut params = CallbackParams::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => params.code = Some(value.into_owned()),
            "state" => params.state = Some(value.into_owned()),
            "error" => params.error = Some(value.into_owned()),
            "error_description" => params.error_description = Some(value.into_owned()),
            _ => {}
        }
    }
    params
}

/// Remove the sensitive callback parameters from the visible URL via a
/// history-replace. Idempotent: a URL without them is left unchanged.
pub(crate) fn strip_callback_params(navigator: &dyn Navigator) {
    const SENSITIVE: [&str; 4] = ["code", "state", "error", "error_description"];
    let current = navigator.current_url();
    if !current.query_pairs().any(|(k, _)| SENSITIVE.contains(&k.as_ref())) {
        return;
    }

    let retained: Vec<(String, String)> = current
        .query_pairs()
        .filter(|(k, _)| !SENSITIVE.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut stripped = current;
    stripped.set_query(None);
    if !retained.is_empty() {
        stripped.query_pairs_mut().extend_pairs(retained);
    }
    navigator.replace(stripped);
}

/// Validate callback parameters against the stored pending state
///
/// CSRF and replay defenses: missing stored state, state mismatch, and stored
/// state older than ten minutes are all plain failures. The caller has already
/// consumed the pending state, so cleanup happens regardless of outcome.
pub(crate) fn validate_callback(
    platform: Platform,
    params: &CallbackParams,
    pending: Option<PendingFlowState>,
) -> Result<(String, PendingFlowState), AuthError> {
    if let Some(code) = &params.error {
        let kind = classify_provider_code(platform, code);
        let kind = if kind == ErrorKind::UnknownError {
            ErrorKind::AuthorizationFailed
        } else {
            kind
        };
        return Err(AuthError::new(
            kind,
            platform,
            params
                .error_description
                .clone()
                .unwrap_or_else(|| format!("provider returned error: {code}")),
        )
        .with_details(serde_json::json!({ "provider_code": code })));
    }

    let (Some(code), Some(received_state)) = (&params.code, &params.state) else {
        return Err(AuthError::new(
            ErrorKind::AuthorizationFailed,
            platform,
            "callback is missing required parameters",
        )
        .with_details(serde_json::json!({ "reason": "missing_params" })));
    };

    let Some(pending) = pending else {
        return Err(AuthError::new(
            ErrorKind::AuthorizationFailed,
            platform,
            "no pending login for this callback",
        )
        .with_details(serde_json::json!({ "reason": "invalid_state" })));
    };

    if pending.state != *received_state {
        return Err(AuthError::new(
            ErrorKind::AuthorizationFailed,
            platform,
            "state parameter does not match the pending login",
        )
        .with_details(serde_json::json!({ "reason": "state_mismatch" })));
    }

    if pending.is_expired() {
        return Err(AuthError::new(
            ErrorKind::AuthorizationFailed,
            platform,
            "pending login is older than ten minutes",
        )
        .with_details(serde_json::json!({ "reason": "state_expired" })));
    }

    Ok((code.clone(), pending))
}

/// Whether the current URL carries callback parameters for a provider with a
/// stored pending state
pub(crate) fn matches_callback(
    platform: Platform,
    url: &Url,
    store: &dyn StateStore,
) -> bool {
    let params = parse_callback(url);
    let has_callback_shape =
        params.state.is_some() && (params.code.is_some() || params.error.is_some());
    has_callback_shape && store.get(&PendingFlowState::storage_key(platform)).is_some()
}

/// Authorization-code redirect flow for LINE Login
pub struct RedirectCodeFlow {
    core: FlowCore,
    navigator: Arc<dyn Navigator>,
    store: Arc<dyn StateStore>,
    tokens: Arc<dyn TokenExchangeApi>,
    client_id: String,
    redirect_uri: String,
    default_scopes: Vec<String>,
    default_bot_prompt: Option<String>,
}

impl RedirectCodeFlow {
    #[must_use]
    pub fn new(
        navigator: Arc<dyn Navigator>,
        store: Arc<dyn StateStore>,
        tokens: Arc<dyn TokenExchangeApi>,
        client_id: String,
        redirect_uri: String,
        default_scopes: Vec<String>,
        default_bot_prompt: Option<String>,
    ) -> Self {
        Self {
            core: FlowCore::new(Platform::Line),
            navigator,
            store,
            tokens,
            client_id,
            redirect_uri,
            default_scopes,
            default_bot_prompt,
        }
    }

    fn authorization_url(
        &self,
        state: &str,
        nonce: &str,
        redirect_uri: &str,
        options: &LoginOptions,
    ) -> Result<Url, AuthError> {
        let mut scopes = self.default_scopes.clone();
        if scopes.is_empty() {
            scopes = vec!["profile".to_string(), "openid".to_string()];
        }
        for scope in &options.scopes {
            if !scopes.contains(scope) {
                scopes.push(scope.clone());
            }
        }

        let mut url = Url::parse(line::AUTHORIZE_ENDPOINT).map_err(|e| {
            AuthError::new(ErrorKind::InvalidConfig, Platform::Line, e.to_string())
        })?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("state", state)
                .append_pair("scope", &scopes.join(" "))
                .append_pair("nonce", nonce);
            if let Some(bot_prompt) =
                options.bot_prompt.as_ref().or(self.default_bot_prompt.as_ref())
            {
                query.append_pair("bot_prompt", bot_prompt);
            }
        }
        Ok(url)
    }

    fn run(&self, options: &LoginOptions) -> Result<FlowOutcome, AuthError> {
        let state = generate_state_token();
        let nonce = generate_nonce(32);
        let redirect_uri = options
            .redirect_uri
            .clone()
            .unwrap_or_else(|| self.redirect_uri.clone());

        let pending = PendingFlowState::new(
            state.clone(),
            nonce.clone(),
            FlowMode::Redirect,
            Some(redirect_uri.clone()),
        );
        pending.persist(self.store.as_ref(), Platform::Line).map_err(|e| {
            AuthError::new(
                ErrorKind::UnknownError,
                Platform::Line,
                format!("failed to persist pending login: {e}"),
            )
        })?;

        let url = self.authorization_url(&state, &nonce, &redirect_uri, options)?;
        log::info!("[line] redirecting to authorization endpoint");
        self.navigator.assign(url);
        Ok(FlowOutcome::RedirectPending)
    }

    async fn complete(&self) -> Result<FlowOutcome, AuthError> {
        let url = self.navigator.current_url();
        let params = parse_callback(&url);
        // Consumed up front so cleanup happens on every outcome
        let pending = PendingFlowState::take(self.store.as_ref(), Platform::Line);

        let (code, pending) = validate_callback(Platform::Line, &params, pending)?;
        let redirect_uri = pending
            .redirect_uri
            .clone()
            .unwrap_or_else(|| self.redirect_uri.clone());

        let tokens = self.tokens.exchange_code(&code, &redirect_uri).await?;
        let profile = self.tokens.fetch_profile(&tokens.access_token).await?;

        let mut identity =
            AuthenticatedIdentity::new(Platform::Line, profile.id, tokens.access_token);
        identity.display_name = profile.name;
        identity.avatar_url = profile.picture;
        identity.refresh_token = tokens.refresh_token;
        identity.id_token = tokens.id_token;
        identity.authorization_code = Some(code);
        Ok(FlowOutcome::Completed(identity))
    }
}

#[async_trait]
impl LoginFlow for RedirectCodeFlow {
    fn platform(&self) -> Platform {
        Platform::Line
    }

    fn state(&self) -> FlowState {
        self.core.state()
    }

    async fn ready(&self) -> bool {
        // Pure redirect flow: no SDK to load
        true
    }

    async fn login(&self, options: &LoginOptions) -> Result<FlowOutcome, AuthError> {
        let generation = self.core.begin();
        let result = self.run(options);
        // finish() would drop the in-memory pending slot; the redirect flow
        // keeps its pending state in the store, so only record the state here.
        if self.core.is_current(generation) {
            match &result {
                Ok(_) => self.core.set_state(FlowState::Redirecting),
                Err(_) => self.core.set_state(FlowState::Failed),
            }
            result
        } else {
            Err(AuthError::stale(Platform::Line))
        }
    }

    fn is_callback_url(&self, url: &Url) -> bool {
        matches_callback(Platform::Line, url, self.store.as_ref())
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
        let Some(token) = self.store.remove(&token_cache_key(Platform::Line)) else {
            return Ok(());
        };
        self.tokens.revoke(&token).await
    }
}
