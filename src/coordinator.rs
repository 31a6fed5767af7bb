//! Session/result aggregator
//!
//! The façade callers go through: `login` fans out to the right provider
//! state machine wrapped in retry, circuit breaker, and one-shot recovery;
//! `logout` tolerates per-provider failures independently;
//! `handle_redirect_callback` resumes redirect flows after navigation back.
//! Only this type writes session state.

use crate::error::{AuthError, ErrorKind};
use crate::flows::{
    CredentialPopupFlow, FlowOutcome, LoginFlow, PopupTokenFlow, RedirectCodeFlow, WidgetFlow,
};
use crate::models::{AuthResult, AuthenticatedIdentity, LoginOptions, Platform, ProviderStatus};
use crate::providers::{
    CredentialPopupSdk, GoogleUserinfoClient, KakaoApiClient, KakaoTokenClient, LineTokenClient,
    PopupTokenSdk, ProfileApi, ProviderSdk, TokenExchangeApi, WidgetSdk,
};
use crate::resilience::{
    retry_with_observer, CircuitBreaker, CircuitBreakerConfig, RecoveryRegistry, RetryPolicy,
    SdkReloadStrategy, TokenPurgeStrategy,
};
use crate::runtime::{token_cache_key, MemoryNavigator, MemoryStateStore, Navigator, StateStore};
use crate::session::SessionHandle;
use crate::settings::AuthflowSettings;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Fixed probe order for redirect-callback auto-detection
const CALLBACK_PROBE_ORDER: [Platform; 2] = [Platform::Line, Platform::Kakao];

/// How one `login` call ended
///
/// Redirect-mode logins navigate the page away, so they cannot produce a
/// terminal [`AuthResult`] in the same call; the result surfaces through
/// [`AuthCoordinator::handle_redirect_callback`] on the next load.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Completed(AuthResult),
    RedirectPending { platform: Platform },
}

impl LoginOutcome {
    #[must_use]
    pub fn into_result(self) -> Option<AuthResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::RedirectPending { .. } => None,
        }
    }
}

pub struct AuthCoordinator {
    session: SessionHandle,
    navigator: Arc<dyn Navigator>,
    store: Arc<dyn StateStore>,
    flows: HashMap<Platform, Arc<dyn LoginFlow>>,
    breakers: HashMap<Platform, CircuitBreaker>,
    policy: RetryPolicy,
    recovery: RecoveryRegistry,
}

impl AuthCoordinator {
    #[must_use]
    pub fn builder(settings: AuthflowSettings) -> AuthCoordinatorBuilder {
        AuthCoordinatorBuilder::new(settings)
    }

    /// Assemble a coordinator from prebuilt parts; the builder is the usual
    /// entry point, this one serves tests and custom embeddings.
    #[must_use]
    pub fn from_parts(
        session: SessionHandle,
        navigator: Arc<dyn Navigator>,
        store: Arc<dyn StateStore>,
        flows: HashMap<Platform, Arc<dyn LoginFlow>>,
        breaker_config: &CircuitBreakerConfig,
        policy: RetryPolicy,
        recovery: RecoveryRegistry,
    ) -> Self {
        let breakers = flows
            .keys()
            .map(|&platform| (platform, CircuitBreaker::new(platform, breaker_config.clone())))
            .collect();
        Self {
            session,
            navigator,
            store,
            flows,
            breakers,
            policy,
            recovery,
        }
    }

    /// Reactive session state consumed by the UI layer
    #[must_use]
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Run one logical login for `platform`
    ///
    /// The flow runs through the circuit breaker inside the retry engine; on
    /// terminal failure the recovery registry gets one attempt, and if it
    /// reports success the flow is retried exactly once more.
    pub async fn login(&self, platform: Platform, options: LoginOptions) -> LoginOutcome {
        let Some(flow) = self.flows.get(&platform) else {
            let error = AuthError::new(
                ErrorKind::MissingClientId,
                platform,
                format!("{platform} login is not configured"),
            );
            self.session.fail_login(error.clone());
            return LoginOutcome::Completed(AuthResult::Failure { error });
        };

        self.session.begin_login(platform);
        let breaker = &self.breakers[&platform];

        let mut result = retry_with_observer(
            || breaker.execute(|| flow.login(&options)),
            &self.policy,
            |attempt, error| {
                log::warn!("[{platform}] login attempt {attempt} failed: {error}");
            },
        )
        .await;

        let recovered = match &result {
            Err(error) if !error.is_stale() => self.recovery.attempt_recovery(error).await,
            _ => false,
        };
        if recovered {
            log::info!("[{platform}] recovery succeeded, retrying login once");
            result = breaker.execute(|| flow.login(&options)).await;
        }

        match result {
            Ok(FlowOutcome::Completed(user)) => {
                LoginOutcome::Completed(self.commit(user))
            }
            Ok(FlowOutcome::RedirectPending) => {
                // Loading state survives the navigation; the callback handler
                // settles it on the next load.
                LoginOutcome::RedirectPending { platform }
            }
            Err(error) if error.is_stale() => {
                // A newer attempt owns the session state now
                LoginOutcome::Completed(AuthResult::Failure { error })
            }
            Err(error) => {
                self.session.fail_login(error.clone());
                LoginOutcome::Completed(AuthResult::Failure { error })
            }
        }
    }

    /// Sign out of one platform, or all of them when `platform` is `None`
    ///
    /// Provider sign-out is best effort and never surfaces to the caller; a
    /// failing provider does not block clearing the others.
    pub async fn logout(&self, platform: Option<Platform>) {
        match platform {
            Some(platform) => self.logout_platform(platform).await,
            None => {
                for platform in self.session.authenticated_platforms() {
                    self.logout_platform(platform).await;
                }
                self.session.clear_all();
            }
        }
    }

    async fn logout_platform(&self, platform: Platform) {
        if let Some(flow) = self.flows.get(&platform) {
            if let Err(error) = flow.sign_out().await {
                log::warn!("[{platform}] provider sign-out failed (ignored): {error}");
            }
        }
        self.store.remove(&token_cache_key(platform));
        self.session.remove_platform(platform);
    }

    /// Resume a redirect flow after the page navigated back
    ///
    /// With no explicit platform, each redirect-capable provider's callback
    /// predicate is probed in a fixed order; returns `None` when the current
    /// URL is no one's callback.
    pub async fn handle_redirect_callback(&self, platform: Option<Platform>) -> Option<AuthResult> {
        let flow = match platform {
            Some(platform) => Arc::clone(self.flows.get(&platform)?),
            None => {
                let url = self.navigator.current_url();
                CALLBACK_PROBE_ORDER.iter().find_map(|candidate| {
                    self.flows
                        .get(candidate)
                        .filter(|flow| flow.is_callback_url(&url))
                        .map(Arc::clone)
                })?
            }
        };

        let platform = flow.platform();
        log::info!("[{platform}] resuming redirect callback");
        match flow.handle_redirect_callback().await {
            Ok(FlowOutcome::Completed(user)) => Some(self.commit(user)),
            Ok(FlowOutcome::RedirectPending) => None,
            Err(error) => {
                self.session.fail_login(error.clone());
                Some(AuthResult::Failure { error })
            }
        }
    }

    /// Snapshot of one provider for rendering availability
    pub async fn provider_status(&self, platform: Platform) -> ProviderStatus {
        let ready = match self.flows.get(&platform) {
            Some(flow) => flow.ready().await,
            None => false,
        };
        let login_state = self.session.login_state();
        let user = self
            .session
            .current_user()
            .filter(|user| user.platform == platform);
        ProviderStatus {
            platform,
            ready,
            loading: login_state.is_loading && login_state.platform == Some(platform),
            authenticated: self.session.is_authenticated(platform),
            user,
        }
    }

    fn commit(&self, user: AuthenticatedIdentity) -> AuthResult {
        self.store
            .set(&token_cache_key(user.platform), &user.access_token);
        self.session.set_user(user.clone());
        AuthResult::Success { user }
    }
}

/// Wires flows, breakers, and recovery from settings plus the SDK adapters the
/// embedding layer supplies. Providers that are disabled or missing required
/// configuration are skipped (their `login` fails with `MISSING_CLIENT_ID`).
pub struct AuthCoordinatorBuilder {
    settings: AuthflowSettings,
    session: SessionHandle,
    navigator: Arc<dyn Navigator>,
    store: Arc<dyn StateStore>,
    google_sdk: Option<Arc<dyn PopupTokenSdk>>,
    google_profile: Option<Arc<dyn ProfileApi>>,
    kakao_sdk: Option<Arc<dyn CredentialPopupSdk>>,
    kakao_profile: Option<Arc<dyn ProfileApi>>,
    kakao_tokens: Option<Arc<dyn TokenExchangeApi>>,
    line_tokens: Option<Arc<dyn TokenExchangeApi>>,
    telegram_sdk: Option<Arc<dyn WidgetSdk>>,
    lifecycle: Vec<Arc<dyn ProviderSdk>>,
}

impl AuthCoordinatorBuilder {
    #[must_use]
    pub fn new(settings: AuthflowSettings) -> Self {
        let navigator = Arc::new(MemoryNavigator::new(&settings.application.redirect_base_url));
        Self {
            settings,
            session: SessionHandle::new(),
            navigator,
            store: Arc::new(MemoryStateStore::new()),
            google_sdk: None,
            google_profile: None,
            kakao_sdk: None,
            kakao_profile: None,
            kakao_tokens: None,
            line_tokens: None,
            telegram_sdk: None,
            lifecycle: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = session;
        self
    }

    #[must_use]
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn with_google_sdk(mut self, sdk: Arc<dyn PopupTokenSdk>) -> Self {
        self.lifecycle.push(Arc::clone(&sdk) as Arc<dyn ProviderSdk>);
        self.google_sdk = Some(sdk);
        self
    }

    /// Override the google profile endpoint client (tests)
    #[must_use]
    pub fn with_google_profile(mut self, profile: Arc<dyn ProfileApi>) -> Self {
        self.google_profile = Some(profile);
        self
    }

    #[must_use]
    pub fn with_kakao_sdk(mut self, sdk: Arc<dyn CredentialPopupSdk>) -> Self {
        self.lifecycle.push(Arc::clone(&sdk) as Arc<dyn ProviderSdk>);
        self.kakao_sdk = Some(sdk);
        self
    }

    /// Override the kakao user API client (tests)
    #[must_use]
    pub fn with_kakao_profile(mut self, profile: Arc<dyn ProfileApi>) -> Self {
        self.kakao_profile = Some(profile);
        self
    }

    /// Override the kakao token-exchange client (tests)
    #[must_use]
    pub fn with_kakao_tokens(mut self, tokens: Arc<dyn TokenExchangeApi>) -> Self {
        self.kakao_tokens = Some(tokens);
        self
    }

    /// Override the LINE token-exchange client (tests)
    #[must_use]
    pub fn with_line_tokens(mut self, tokens: Arc<dyn TokenExchangeApi>) -> Self {
        self.line_tokens = Some(tokens);
        self
    }

    #[must_use]
    pub fn with_telegram_sdk(mut self, sdk: Arc<dyn WidgetSdk>) -> Self {
        self.lifecycle.push(Arc::clone(&sdk) as Arc<dyn ProviderSdk>);
        self.telegram_sdk = Some(sdk);
        self
    }

    /// Build the coordinator
    ///
    /// # Errors
    ///
    /// Returns an error only for malformed configuration; a provider that is
    /// merely unconfigured is skipped.
    pub fn build(self) -> anyhow::Result<AuthCoordinator> {
        let timeout = Duration::from_secs(self.settings.application.login_timeout_secs);
        let mut flows: HashMap<Platform, Arc<dyn LoginFlow>> = HashMap::new();

        if let Some(provider) = self.settings.find_provider("google") {
            if provider.enabled {
                match &self.google_sdk {
                    Some(sdk) => {
                        let profile = self
                            .google_profile
                            .clone()
                            .unwrap_or_else(|| Arc::new(GoogleUserinfoClient::new()));
                        flows.insert(
                            Platform::Google,
                            Arc::new(PopupTokenFlow::new(
                                Arc::clone(sdk),
                                profile,
                                provider.scopes.clone(),
                                timeout,
                            )),
                        );
                    }
                    None => log::warn!("[google] enabled but no SDK adapter supplied, skipping"),
                }
            }
        }

        if let Some(provider) = self.settings.find_provider("kakao") {
            if provider.enabled {
                match (&self.kakao_sdk, provider.get_client_id()) {
                    (Some(sdk), Some(client_id)) => {
                        let profile = self
                            .kakao_profile
                            .clone()
                            .unwrap_or_else(|| Arc::new(KakaoApiClient::new()));
                        let tokens = self.kakao_tokens.clone().unwrap_or_else(|| {
                            Arc::new(KakaoTokenClient::new(
                                client_id.clone(),
                                provider.get_client_secret(),
                            ))
                        });
                        flows.insert(
                            Platform::Kakao,
                            Arc::new(CredentialPopupFlow::new(
                                Arc::clone(sdk),
                                profile,
                                tokens,
                                Arc::clone(&self.navigator),
                                Arc::clone(&self.store),
                                client_id,
                                self.settings.redirect_uri_for(provider),
                                provider.scopes.clone(),
                                timeout,
                            )),
                        );
                    }
                    (None, _) => {
                        log::warn!("[kakao] enabled but no SDK adapter supplied, skipping");
                    }
                    (_, None) => log::warn!("[kakao] enabled but client_id missing, skipping"),
                }
            }
        }

        if let Some(provider) = self.settings.find_provider("line") {
            if provider.enabled {
                match (provider.get_client_id(), provider.get_client_secret()) {
                    (Some(client_id), Some(client_secret)) => {
                        let tokens = self.line_tokens.clone().unwrap_or_else(|| {
                            Arc::new(LineTokenClient::new(client_id.clone(), client_secret))
                        });
                        flows.insert(
                            Platform::Line,
                            Arc::new(RedirectCodeFlow::new(
                                Arc::clone(&self.navigator),
                                Arc::clone(&self.store),
                                tokens,
                                client_id,
                                self.settings.redirect_uri_for(provider),
                                provider.scopes.clone(),
                                provider.bot_prompt.clone(),
                            )),
                        );
                    }
                    _ => log::warn!("[line] enabled but channel credentials missing, skipping"),
                }
            }
        }

        if let Some(provider) = self.settings.find_provider("telegram") {
            if provider.enabled {
                match (&self.telegram_sdk, provider.get_bot_token()) {
                    (Some(sdk), Some(bot_token)) => {
                        flows.insert(
                            Platform::Telegram,
                            Arc::new(WidgetFlow::new(Arc::clone(sdk), bot_token, timeout)),
                        );
                    }
                    (None, _) => {
                        log::warn!("[telegram] enabled but no SDK adapter supplied, skipping");
                    }
                    (_, None) => log::warn!("[telegram] enabled but bot_token missing, skipping"),
                }
            }
        }

        let mut recovery = RecoveryRegistry::new();
        recovery.register(Box::new(SdkReloadStrategy::new(self.lifecycle)));
        recovery.register(Box::new(TokenPurgeStrategy::new(Arc::clone(&self.store))));

        Ok(AuthCoordinator::from_parts(
            self.session,
            self.navigator,
            self.store,
            flows,
            &CircuitBreakerConfig::from_settings(&self.settings.breaker),
            RetryPolicy::from_settings(&self.settings.retry),
            recovery,
        ))
    }
}
