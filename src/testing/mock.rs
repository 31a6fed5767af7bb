//! Scriptable doubles for the SDK and API traits
//!
//! Each mock pops one scripted behavior per call, in order, and counts its
//! invocations so tests can assert how many attempts the resilience layer
//! actually made. An exhausted script panics: a test that triggers more SDK
//! calls than it scripted is a broken test.

use crate::error::{AuthError, ErrorKind, SdkError};
use crate::models::Platform;
use crate::providers::{
    CredentialPopupSdk, ExchangedTokens, PopupProbe, PopupRequest, PopupTokenSdk, ProfileApi,
    ProviderProfile, ProviderSdk, TokenExchangeApi, TokenPayload, TokenRequest, WidgetPayload,
    WidgetRequest, WidgetSdk, WidgetSession,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// One scripted behavior for a popup-opening call
pub enum PopupScript {
    /// The SDK callback fires immediately with this result
    Deliver(Result<TokenPayload, SdkError>),
    /// The callback never fires and the popup reports closed
    ClosedSilently,
    /// The callback never fires and the popup stays open (forces the timeout)
    Hang,
    /// Opening the popup itself fails
    Fail(AuthError),
}

struct StaticProbe {
    closed: bool,
}

impl PopupProbe for StaticProbe {
    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Shared lifecycle behavior for every mock SDK
struct MockLifecycle {
    platform: Platform,
    ready: AtomicBool,
    reloads: AtomicU32,
    sign_outs: AtomicU32,
    sign_out_error: Mutex<Option<AuthError>>,
    // Senders kept alive so hung completions pend instead of erroring
    parked: Mutex<Vec<Box<dyn std::any::Any + Send>>>,
}

impl MockLifecycle {
    fn new(platform: Platform) -> Self {
        Self {
            platform,
            ready: AtomicBool::new(true),
            reloads: AtomicU32::new(0),
            sign_outs: AtomicU32::new(0),
            sign_out_error: Mutex::new(None),
            parked: Mutex::new(Vec::new()),
        }
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        match self.sign_out_error.lock().expect("mock poisoned").clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn park<T: Send + 'static>(&self, sender: oneshot::Sender<T>) {
        self.parked.lock().expect("mock poisoned").push(Box::new(sender));
    }

    fn ensure_ready(&self) -> Result<(), AuthError> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AuthError::new(
                ErrorKind::SdkLoadFailed,
                self.platform,
                "SDK script failed to load",
            ))
        }
    }
}

fn popup_request<T: Send + 'static>(
    lifecycle: &MockLifecycle,
    script: PopupScript,
    build: impl FnOnce(oneshot::Receiver<Result<TokenPayload, SdkError>>, Arc<dyn PopupProbe>) -> T,
) -> Result<T, AuthError> {
    let (tx, rx) = oneshot::channel();
    let closed = match script {
        PopupScript::Deliver(result) => {
            let _ = tx.send(result);
            false
        }
        PopupScript::ClosedSilently => {
            lifecycle.park(tx);
            true
        }
        PopupScript::Hang => {
            lifecycle.park(tx);
            false
        }
        PopupScript::Fail(error) => return Err(error),
    };
    Ok(build(rx, Arc::new(StaticProbe { closed })))
}

/// Scriptable token-popup SDK (google style)
pub struct MockPopupSdk {
    lifecycle: MockLifecycle,
    scripts: Mutex<VecDeque<PopupScript>>,
    pub calls: AtomicU32,
    pub last_request: Mutex<Option<TokenRequest>>,
}

impl MockPopupSdk {
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self {
            lifecycle: MockLifecycle::new(platform),
            scripts: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn script(&self, script: PopupScript) {
        self.scripts.lock().expect("mock poisoned").push_back(script);
    }

    pub fn set_ready(&self, ready: bool) {
        self.lifecycle.ready.store(ready, Ordering::SeqCst);
    }

    pub fn fail_sign_out(&self, error: AuthError) {
        *self.lifecycle.sign_out_error.lock().expect("mock poisoned") = Some(error);
    }

    #[must_use]
    pub fn reload_count(&self) -> u32 {
        self.lifecycle.reloads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn sign_out_count(&self) -> u32 {
        self.lifecycle.sign_outs.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderSdk for MockPopupSdk {
    fn platform(&self) -> Platform {
        self.lifecycle.platform
    }

    async fn is_ready(&self) -> bool {
        self.lifecycle.ready.load(Ordering::SeqCst)
    }

    async fn ensure_ready(&self) -> Result<(), AuthError> {
        self.lifecycle.ensure_ready()
    }

    async fn reload(&self) -> Result<(), AuthError> {
        self.lifecycle.reloads.fetch_add(1, Ordering::SeqCst);
        self.lifecycle.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.lifecycle.sign_out()
    }
}

#[async_trait]
impl PopupTokenSdk for MockPopupSdk {
    async fn request_token(&self, request: TokenRequest) -> Result<PopupRequest, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().expect("mock poisoned") = Some(request);
        let script = self
            .scripts
            .lock()
            .expect("mock poisoned")
            .pop_front()
            .expect("MockPopupSdk script exhausted");
        popup_request(&self.lifecycle, script, |completion, popup| PopupRequest {
            completion,
            popup,
        })
    }
}

/// Scriptable authorize-popup SDK (kakao style)
pub struct MockCredentialSdk {
    lifecycle: MockLifecycle,
    scripts: Mutex<VecDeque<PopupScript>>,
    pub calls: AtomicU32,
}

impl MockCredentialSdk {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lifecycle: MockLifecycle::new(Platform::Kakao),
            scripts: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn script(&self, script: PopupScript) {
        self.scripts.lock().expect("mock poisoned").push_back(script);
    }

    pub fn set_ready(&self, ready: bool) {
        self.lifecycle.ready.store(ready, Ordering::SeqCst);
    }

    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn sign_out_count(&self) -> u32 {
        self.lifecycle.sign_outs.load(Ordering::SeqCst)
    }
}

impl Default for MockCredentialSdk {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderSdk for MockCredentialSdk {
    fn platform(&self) -> Platform {
        self.lifecycle.platform
    }

    async fn is_ready(&self) -> bool {
        self.lifecycle.ready.load(Ordering::SeqCst)
    }

    async fn ensure_ready(&self) -> Result<(), AuthError> {
        self.lifecycle.ensure_ready()
    }

    async fn reload(&self) -> Result<(), AuthError> {
        self.lifecycle.reloads.fetch_add(1, Ordering::SeqCst);
        self.lifecycle.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.lifecycle.sign_out()
    }
}

#[async_trait]
impl CredentialPopupSdk for MockCredentialSdk {
    async fn authorize(&self, _request: TokenRequest) -> Result<PopupRequest, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .expect("mock poisoned")
            .pop_front()
            .expect("MockCredentialSdk script exhausted");
        popup_request(&self.lifecycle, script, |completion, popup| PopupRequest {
            completion,
            popup,
        })
    }
}

/// One scripted behavior for a widget mount
pub enum WidgetScript {
    /// The widget callback fires immediately with this result
    Deliver(Result<WidgetPayload, SdkError>),
    /// The callback never fires (forces the timeout)
    Hang,
    /// Mounting itself fails
    Fail(AuthError),
}

/// Scriptable consent-widget SDK (telegram style)
pub struct MockWidgetSdk {
    lifecycle: MockLifecycle,
    scripts: Mutex<VecDeque<WidgetScript>>,
    pub mount_calls: AtomicU32,
    pub unmount_calls: AtomicU32,
    pub last_callback_name: Mutex<Option<String>>,
    echo_callback_name: Mutex<Option<String>>,
}

impl MockWidgetSdk {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lifecycle: MockLifecycle::new(Platform::Telegram),
            scripts: Mutex::new(VecDeque::new()),
            mount_calls: AtomicU32::new(0),
            unmount_calls: AtomicU32::new(0),
            last_callback_name: Mutex::new(None),
            echo_callback_name: Mutex::new(None),
        }
    }

    pub fn script(&self, script: WidgetScript) {
        self.scripts.lock().expect("mock poisoned").push_back(script);
    }

    /// Make `mount` report this callback name instead of the requested one
    pub fn echo_callback_name(&self, name: &str) {
        *self.echo_callback_name.lock().expect("mock poisoned") = Some(name.to_string());
    }

    pub fn set_ready(&self, ready: bool) {
        self.lifecycle.ready.store(ready, Ordering::SeqCst);
    }

    #[must_use]
    pub fn mount_count(&self) -> u32 {
        self.mount_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn unmount_count(&self) -> u32 {
        self.unmount_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockWidgetSdk {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderSdk for MockWidgetSdk {
    fn platform(&self) -> Platform {
        self.lifecycle.platform
    }

    async fn is_ready(&self) -> bool {
        self.lifecycle.ready.load(Ordering::SeqCst)
    }

    async fn ensure_ready(&self) -> Result<(), AuthError> {
        self.lifecycle.ensure_ready()
    }

    async fn reload(&self) -> Result<(), AuthError> {
        self.lifecycle.reloads.fetch_add(1, Ordering::SeqCst);
        self.lifecycle.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.lifecycle.sign_out()
    }
}

#[async_trait]
impl WidgetSdk for MockWidgetSdk {
    async fn mount(&self, request: WidgetRequest) -> Result<WidgetSession, AuthError> {
        self.mount_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_callback_name.lock().expect("mock poisoned") =
            Some(request.callback_name.clone());
        let script = self
            .scripts
            .lock()
            .expect("mock poisoned")
            .pop_front()
            .expect("MockWidgetSdk script exhausted");
        let (tx, rx) = oneshot::channel();
        match script {
            WidgetScript::Deliver(result) => {
                let _ = tx.send(result);
            }
            WidgetScript::Hang => self.lifecycle.park(tx),
            WidgetScript::Fail(error) => return Err(error),
        }
        let registered = self
            .echo_callback_name
            .lock()
            .expect("mock poisoned")
            .clone()
            .unwrap_or(request.callback_name);
        Ok(WidgetSession {
            completion: rx,
            callback_name: registered,
        })
    }

    async fn unmount(&self) {
        self.unmount_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scriptable profile endpoint
///
/// Pops scripted responses first; once the script is empty every call returns
/// the fallback profile.
pub struct MockProfileApi {
    fallback: ProviderProfile,
    scripts: Mutex<VecDeque<Result<ProviderProfile, AuthError>>>,
    pub calls: AtomicU32,
}

impl MockProfileApi {
    #[must_use]
    pub fn returning(fallback: ProviderProfile) -> Self {
        Self {
            fallback,
            scripts: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn script(&self, response: Result<ProviderProfile, AuthError>) {
        self.scripts.lock().expect("mock poisoned").push_back(response);
    }

    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileApi for MockProfileApi {
    async fn fetch_profile(&self, _access_token: &str) -> Result<ProviderProfile, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.scripts
            .lock()
            .expect("mock poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Scriptable code-exchange endpoint, recording the last exchanged code
pub struct MockTokenExchange {
    profile: ProviderProfile,
    exchanges: Mutex<VecDeque<Result<ExchangedTokens, AuthError>>>,
    pub exchange_calls: AtomicU32,
    pub revoke_calls: AtomicU32,
    pub last_code: Mutex<Option<(String, String)>>,
}

impl MockTokenExchange {
    #[must_use]
    pub fn new(profile: ProviderProfile) -> Self {
        Self {
            profile,
            exchanges: Mutex::new(VecDeque::new()),
            exchange_calls: AtomicU32::new(0),
            revoke_calls: AtomicU32::new(0),
            last_code: Mutex::new(None),
        }
    }

    pub fn script_exchange(&self, response: Result<ExchangedTokens, AuthError>) {
        self.exchanges.lock().expect("mock poisoned").push_back(response);
    }

    #[must_use]
    pub fn exchange_count(&self) -> u32 {
        self.exchange_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenExchangeApi for MockTokenExchange {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ExchangedTokens, AuthError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_code.lock().expect("mock poisoned") =
            Some((code.to_string(), redirect_uri.to_string()));
        self.exchanges
            .lock()
            .expect("mock poisoned")
            .pop_front()
            .expect("MockTokenExchange exchange script exhausted")
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<ProviderProfile, AuthError> {
        Ok(self.profile.clone())
    }

    async fn revoke(&self, _access_token: &str) -> Result<(), AuthError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
