//! Redirect-mode round trips: CSRF state validation, replay defenses, and
//! callback-parameter cleanup

use authflow::error::ErrorKind;
use authflow::flows::{FlowOutcome, LoginFlow, RedirectCodeFlow};
use authflow::models::{FlowMode, LoginOptions, PendingFlowState, Platform};
use authflow::providers::TokenExchangeApi;
use authflow::runtime::{MemoryNavigator, MemoryStateStore, Navigator, StateStore};
use authflow::testing::fixtures::{exchanged_tokens, profile_for};
use authflow::testing::mock::MockTokenExchange;
use std::sync::Arc;
use url::Url;

struct Harness {
    flow: RedirectCodeFlow,
    tokens: Arc<MockTokenExchange>,
    navigator: Arc<MemoryNavigator>,
    store: Arc<MemoryStateStore>,
}

fn harness() -> Harness {
    let tokens = Arc::new(MockTokenExchange::new(profile_for(Platform::Line)));
    let navigator = Arc::new(MemoryNavigator::new("https://app.example.com/home"));
    let store = Arc::new(MemoryStateStore::new());
    let flow = RedirectCodeFlow::new(
        Arc::clone(&navigator) as Arc<dyn Navigator>,
        Arc::clone(&store) as Arc<dyn StateStore>,
        Arc::clone(&tokens) as Arc<dyn TokenExchangeApi>,
        "line-channel".to_string(),
        "https://app.example.com/auth/callback".to_string(),
        vec!["profile".to_string(), "openid".to_string()],
        None,
    );
    Harness {
        flow,
        tokens,
        navigator,
        store,
    }
}

fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Initiate a login and land back on the callback URL with the given params
async fn arrive_at_callback(h: &Harness, extra: &str) -> String {
    let outcome = h.flow.login(&LoginOptions::default()).await.unwrap();
    assert!(matches!(outcome, FlowOutcome::RedirectPending));
    let authorize = h.navigator.last_assigned().unwrap();
    let state = query_param(&authorize, "state").unwrap();
    h.navigator.set_current(&format!(
        "https://app.example.com/auth/callback?{extra}&state={state}"
    ));
    state
}

#[tokio::test]
async fn login_builds_authorization_url_and_persists_pending() {
    let h = harness();
    let outcome = h.flow.login(&LoginOptions::default()).await.unwrap();
    assert!(matches!(outcome, FlowOutcome::RedirectPending));

    let url = h.navigator.last_assigned().unwrap();
    assert!(url.as_str().starts_with("https://access.line.me/oauth2/v2.1/authorize"));
    assert_eq!(query_param(&url, "response_type").as_deref(), Some("code"));
    assert_eq!(query_param(&url, "client_id").as_deref(), Some("line-channel"));
    assert_eq!(query_param(&url, "scope").as_deref(), Some("profile openid"));

    let stored = h
        .store
        .get(&PendingFlowState::storage_key(Platform::Line))
        .expect("pending state must survive the navigation");
    let pending: PendingFlowState = serde_json::from_str(&stored).unwrap();
    assert_eq!(Some(pending.state), query_param(&url, "state"));
    assert_eq!(Some(pending.nonce), query_param(&url, "nonce"));
}

#[tokio::test]
async fn callback_round_trip_completes_and_strips_params() {
    let h = harness();
    h.tokens.script_exchange(Ok(exchanged_tokens("at-line")));
    arrive_at_callback(&h, "code=authz-code-1&keep=me").await;

    let FlowOutcome::Completed(user) = h.flow.handle_redirect_callback().await.unwrap() else {
        panic!("expected a completed login");
    };
    assert_eq!(user.platform, Platform::Line);
    assert_eq!(user.access_token, "at-line");
    assert_eq!(user.authorization_code.as_deref(), Some("authz-code-1"));
    assert_eq!(user.id_token.as_deref(), Some("id-token-1"));

    let (code, redirect_uri) = h.tokens.last_code.lock().unwrap().clone().unwrap();
    assert_eq!(code, "authz-code-1");
    assert_eq!(redirect_uri, "https://app.example.com/auth/callback");

    // sensitive params are gone, unrelated ones survive
    let current = h.navigator.current_url();
    assert!(query_param(&current, "code").is_none());
    assert!(query_param(&current, "state").is_none());
    assert_eq!(query_param(&current, "keep").as_deref(), Some("me"));

    // pending state was consumed
    assert!(h.store.get(&PendingFlowState::storage_key(Platform::Line)).is_none());
}

#[tokio::test]
async fn provider_error_param_fails_authorization() {
    let h = harness();
    arrive_at_callback(&h, "error=access_denied&error_description=User%20denied").await;

    let error = h.flow.handle_redirect_callback().await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::AuthorizationFailed);
    assert_eq!(error.message, "User denied");
    assert_eq!(error.details.unwrap()["provider_code"], "access_denied");

    // cleanup also runs on the failure path
    assert!(query_param(&h.navigator.current_url(), "error").is_none());
}

#[tokio::test]
async fn state_mismatch_is_rejected_and_pending_is_consumed() {
    let h = harness();
    arrive_at_callback(&h, "code=c").await;
    h.navigator
        .set_current("https://app.example.com/auth/callback?code=c&state=forged");

    let error = h.flow.handle_redirect_callback().await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::AuthorizationFailed);
    assert_eq!(error.details.unwrap()["reason"], "state_mismatch");

    // the consumed pending state cannot be replayed with the right value
    h.navigator
        .set_current("https://app.example.com/auth/callback?code=c&state=whatever");
    let error = h.flow.handle_redirect_callback().await.unwrap_err();
    assert_eq!(error.details.unwrap()["reason"], "invalid_state");
    assert_eq!(h.tokens.exchange_count(), 0);
}

#[tokio::test]
async fn callback_without_pending_login_is_rejected() {
    let h = harness();
    h.navigator
        .set_current("https://app.example.com/auth/callback?code=c&state=s");

    let error = h.flow.handle_redirect_callback().await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::AuthorizationFailed);
    assert_eq!(error.details.unwrap()["reason"], "invalid_state");
}

#[tokio::test]
async fn expired_pending_state_is_rejected() {
    let h = harness();
    let mut pending = PendingFlowState::new(
        "old-state".to_string(),
        "old-nonce".to_string(),
        FlowMode::Redirect,
        Some("https://app.example.com/auth/callback".to_string()),
    );
    pending.created_at = pending.created_at - chrono::Duration::minutes(11);
    pending.persist(h.store.as_ref(), Platform::Line).unwrap();
    h.navigator
        .set_current("https://app.example.com/auth/callback?code=c&state=old-state");

    let error = h.flow.handle_redirect_callback().await.unwrap_err();
    assert_eq!(error.details.unwrap()["reason"], "state_expired");
    assert_eq!(h.tokens.exchange_count(), 0);
}

#[tokio::test]
async fn callback_missing_code_is_rejected() {
    let h = harness();
    arrive_at_callback(&h, "unrelated=1").await;

    let error = h.flow.handle_redirect_callback().await.unwrap_err();
    assert_eq!(error.details.unwrap()["reason"], "missing_params");
}

#[tokio::test]
async fn callback_detection_requires_params_and_pending_state() {
    let h = harness();
    let callback = Url::parse("https://app.example.com/auth/callback?code=c&state=s").unwrap();
    assert!(!h.flow.is_callback_url(&callback), "no pending login yet");

    arrive_at_callback(&h, "code=c2").await;
    assert!(h.flow.is_callback_url(&h.navigator.current_url()));

    let plain = Url::parse("https://app.example.com/home").unwrap();
    assert!(!h.flow.is_callback_url(&plain));
}

#[tokio::test]
async fn explicit_redirect_uri_override_is_echoed_to_exchange() {
    let h = harness();
    h.tokens.script_exchange(Ok(exchanged_tokens("at")));

    let options = LoginOptions {
        redirect_uri: Some("https://app.example.com/custom/return".to_string()),
        ..LoginOptions::default()
    };
    h.flow.login(&options).await.unwrap();
    let authorize = h.navigator.last_assigned().unwrap();
    assert_eq!(
        query_param(&authorize, "redirect_uri").as_deref(),
        Some("https://app.example.com/custom/return")
    );

    let state = query_param(&authorize, "state").unwrap();
    h.navigator.set_current(&format!(
        "https://app.example.com/custom/return?code=c&state={state}"
    ));
    h.flow.handle_redirect_callback().await.unwrap();

    let (_, redirect_uri) = h.tokens.last_code.lock().unwrap().clone().unwrap();
    assert_eq!(redirect_uri, "https://app.example.com/custom/return");
}

#[tokio::test]
async fn sign_out_revokes_only_when_a_token_is_cached() {
    let h = harness();
    h.flow.sign_out().await.unwrap();
    assert_eq!(h.tokens.revoke_calls.load(std::sync::atomic::Ordering::SeqCst), 0);

    h.store.set(&authflow::runtime::token_cache_key(Platform::Line), "at-line");
    h.flow.sign_out().await.unwrap();
    assert_eq!(h.tokens.revoke_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(h.store.get(&authflow::runtime::token_cache_key(Platform::Line)).is_none());
}
