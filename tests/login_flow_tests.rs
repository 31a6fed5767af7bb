//! Flow-level behavior of the popup, credential-popup, and widget login styles

use authflow::error::{AuthError, ErrorKind, SdkError};
use authflow::flows::{CredentialPopupFlow, FlowOutcome, LoginFlow, PopupTokenFlow, WidgetFlow};
use authflow::models::{LoginOptions, PendingFlowState, Platform};
use authflow::runtime::{MemoryNavigator, MemoryStateStore, Navigator, StateStore};
use authflow::testing::fixtures::{
    profile_for, signed_widget_payload, test_settings, token_payload, unsigned_widget_payload,
    TEST_BOT_TOKEN,
};
use authflow::testing::mock::{
    MockCredentialSdk, MockPopupSdk, MockProfileApi, MockTokenExchange, MockWidgetSdk,
    PopupScript, WidgetScript,
};
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn popup_flow(sdk: Arc<MockPopupSdk>) -> PopupTokenFlow {
    let profile = Arc::new(MockProfileApi::returning(profile_for(Platform::Google)));
    PopupTokenFlow::new(
        sdk,
        profile,
        vec!["openid".to_string(), "email".to_string()],
        TIMEOUT,
    )
}

#[tokio::test]
async fn popup_login_delivers_identity_with_profile() {
    let sdk = Arc::new(MockPopupSdk::new(Platform::Google));
    sdk.script(PopupScript::Deliver(Ok(token_payload("at-google-1"))));
    let flow = popup_flow(Arc::clone(&sdk));

    let outcome = flow.login(&LoginOptions::default()).await.unwrap();
    let FlowOutcome::Completed(user) = outcome else {
        panic!("expected a completed login");
    };

    assert_eq!(user.platform, Platform::Google);
    assert_eq!(user.external_id, "google-user-1");
    assert_eq!(user.access_token, "at-google-1");
    assert_eq!(user.email.as_deref(), Some("user@google.example"));

    let request = sdk.last_request.lock().unwrap().clone().unwrap();
    assert!(request.scopes.contains(&"openid".to_string()));
    assert!(!request.nonce.is_empty());
}

#[tokio::test]
async fn popup_merges_extra_scopes_without_duplicates() {
    let sdk = Arc::new(MockPopupSdk::new(Platform::Google));
    sdk.script(PopupScript::Deliver(Ok(token_payload("at"))));
    let flow = popup_flow(Arc::clone(&sdk));

    let options = LoginOptions {
        scopes: vec!["email".to_string(), "drive".to_string()],
        ..LoginOptions::default()
    };
    flow.login(&options).await.unwrap();

    let request = sdk.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(request.scopes, vec!["openid", "email", "drive"]);
}

#[tokio::test(start_paused = true)]
async fn popup_closed_without_callback_is_user_cancelled() {
    let sdk = Arc::new(MockPopupSdk::new(Platform::Google));
    sdk.script(PopupScript::ClosedSilently);
    let flow = popup_flow(sdk);

    let error = flow.login(&LoginOptions::default()).await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::UserCancelled);
}

#[tokio::test(start_paused = true)]
async fn popup_that_never_completes_times_out() {
    let sdk = Arc::new(MockPopupSdk::new(Platform::Google));
    sdk.script(PopupScript::Hang);
    let flow = popup_flow(sdk);

    let error = flow.login(&LoginOptions::default()).await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::TimeoutError);
}

#[tokio::test]
async fn provider_cancellation_code_maps_to_user_cancelled() {
    let sdk = Arc::new(MockPopupSdk::new(Platform::Google));
    sdk.script(PopupScript::Deliver(Err(SdkError::new(
        "popup_closed_by_user",
    ))));
    let flow = popup_flow(sdk);

    let error = flow.login(&LoginOptions::default()).await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::UserCancelled);
    assert_eq!(
        error.details.unwrap()["provider_code"],
        "popup_closed_by_user"
    );
}

#[tokio::test]
async fn empty_access_token_is_rejected() {
    let sdk = Arc::new(MockPopupSdk::new(Platform::Google));
    sdk.script(PopupScript::Deliver(Ok(token_payload(""))));
    let flow = popup_flow(sdk);

    let error = flow.login(&LoginOptions::default()).await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::InvalidToken);
}

#[tokio::test(start_paused = true)]
async fn superseded_login_reports_stale_not_cancelled_state() {
    let sdk = Arc::new(MockPopupSdk::new(Platform::Google));
    sdk.script(PopupScript::Hang);
    sdk.script(PopupScript::Deliver(Ok(token_payload("at-second"))));
    let flow = Arc::new(popup_flow(Arc::clone(&sdk)));

    let first = {
        let flow = Arc::clone(&flow);
        tokio::spawn(async move { flow.login(&LoginOptions::default()).await })
    };
    // Let the first attempt reach its completion race
    tokio::task::yield_now().await;

    let second = flow.login(&LoginOptions::default()).await.unwrap();
    assert!(matches!(second, FlowOutcome::Completed(_)));

    // The hung first attempt eventually times out, but its completion belongs
    // to a superseded generation and must be discarded as stale.
    let error = first.await.unwrap().unwrap_err();
    assert!(error.is_stale());
}

fn credential_parts() -> (
    Arc<MockCredentialSdk>,
    Arc<MockTokenExchange>,
    Arc<MemoryNavigator>,
    Arc<MemoryStateStore>,
) {
    (
        Arc::new(MockCredentialSdk::new()),
        Arc::new(MockTokenExchange::new(profile_for(Platform::Kakao))),
        Arc::new(MemoryNavigator::new("https://app.example.com/home")),
        Arc::new(MemoryStateStore::new()),
    )
}

fn credential_flow(
    sdk: &Arc<MockCredentialSdk>,
    tokens: &Arc<MockTokenExchange>,
    navigator: &Arc<MemoryNavigator>,
    store: &Arc<MemoryStateStore>,
) -> CredentialPopupFlow {
    CredentialPopupFlow::new(
        Arc::clone(sdk) as Arc<dyn authflow::providers::CredentialPopupSdk>,
        Arc::new(MockProfileApi::returning(profile_for(Platform::Kakao))),
        Arc::clone(tokens) as Arc<dyn authflow::providers::TokenExchangeApi>,
        Arc::clone(navigator) as Arc<dyn Navigator>,
        Arc::clone(store) as Arc<dyn StateStore>,
        "kakao-client".to_string(),
        "https://app.example.com/auth/callback".to_string(),
        vec![],
        TIMEOUT,
    )
}

#[tokio::test]
async fn credential_popup_completes_with_numeric_id() {
    let (sdk, tokens, navigator, store) = credential_parts();
    sdk.script(PopupScript::Deliver(Ok(token_payload("at-kakao"))));
    let flow = credential_flow(&sdk, &tokens, &navigator, &store);

    let FlowOutcome::Completed(user) = flow.login(&LoginOptions::default()).await.unwrap() else {
        panic!("expected a completed login");
    };
    assert_eq!(user.platform, Platform::Kakao);
    // the mock profile id is not numeric, so the numeric mirror stays unset
    assert_eq!(user.numeric_id, user.external_id.parse().ok());
}

#[tokio::test]
async fn credential_flow_honors_popup_opt_out() {
    let (sdk, tokens, navigator, store) = credential_parts();
    let flow = credential_flow(&sdk, &tokens, &navigator, &store);

    let options = LoginOptions {
        prefer_popup: false,
        ..LoginOptions::default()
    };
    let outcome = flow.login(&options).await.unwrap();
    assert!(matches!(outcome, FlowOutcome::RedirectPending));
    assert_eq!(sdk.call_count(), 0, "popup must not open when opted out");

    let target = navigator.last_assigned().expect("should have navigated");
    assert!(target.as_str().starts_with("https://kauth.kakao.com/oauth/authorize"));
    assert!(store
        .get(&PendingFlowState::storage_key(Platform::Kakao))
        .is_some());
}

#[tokio::test]
async fn blocked_popup_falls_back_to_redirect() {
    let (sdk, tokens, navigator, store) = credential_parts();
    sdk.script(PopupScript::Fail(AuthError::new(
        ErrorKind::PopupBlocked,
        Platform::Kakao,
        "browser blocked the popup",
    )));
    let flow = credential_flow(&sdk, &tokens, &navigator, &store);

    let outcome = flow.login(&LoginOptions::default()).await.unwrap();
    assert!(matches!(outcome, FlowOutcome::RedirectPending));
    assert_eq!(sdk.call_count(), 1);
    assert!(navigator.last_assigned().is_some());
}

fn widget_flow(sdk: Arc<MockWidgetSdk>) -> WidgetFlow {
    WidgetFlow::new(sdk, TEST_BOT_TOKEN.to_string(), TIMEOUT)
}

#[tokio::test]
async fn widget_login_verifies_signature_and_builds_identity() {
    let sdk = Arc::new(MockWidgetSdk::new());
    let payload = signed_widget_payload(777_000_111);
    let expected_token = payload.hash.clone().unwrap();
    sdk.script(WidgetScript::Deliver(Ok(payload)));
    let flow = widget_flow(Arc::clone(&sdk));

    let FlowOutcome::Completed(user) = flow.login(&LoginOptions::default()).await.unwrap() else {
        panic!("expected a completed login");
    };
    assert_eq!(user.platform, Platform::Telegram);
    assert_eq!(user.external_id, "777000111");
    assert_eq!(user.numeric_id, Some(777_000_111));
    assert_eq!(user.access_token, expected_token);
    assert_eq!(sdk.unmount_count(), 1);
}

#[tokio::test]
async fn widget_payload_without_signature_fails_authorization() {
    let sdk = Arc::new(MockWidgetSdk::new());
    sdk.script(WidgetScript::Deliver(Ok(unsigned_widget_payload(42))));
    let flow = widget_flow(Arc::clone(&sdk));

    let error = flow.login(&LoginOptions::default()).await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::AuthorizationFailed);
    assert_eq!(sdk.unmount_count(), 1, "widget must be torn down on failure");
}

#[tokio::test]
async fn widget_payload_with_tampered_signature_fails_authorization() {
    let sdk = Arc::new(MockWidgetSdk::new());
    let mut payload = signed_widget_payload(42);
    payload.username = Some("attacker".to_string());
    sdk.script(WidgetScript::Deliver(Ok(payload)));
    let flow = widget_flow(sdk);

    let error = flow.login(&LoginOptions::default()).await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::AuthorizationFailed);
}

#[tokio::test(start_paused = true)]
async fn widget_timeout_unmounts_and_reports_timeout() {
    let sdk = Arc::new(MockWidgetSdk::new());
    sdk.script(WidgetScript::Hang);
    let flow = widget_flow(Arc::clone(&sdk));

    let error = flow.login(&LoginOptions::default()).await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::TimeoutError);
    assert_eq!(sdk.unmount_count(), 1);
}

#[tokio::test]
async fn widget_callback_name_is_unique_per_attempt() {
    let sdk = Arc::new(MockWidgetSdk::new());
    sdk.script(WidgetScript::Deliver(Ok(signed_widget_payload(1))));
    sdk.script(WidgetScript::Deliver(Ok(signed_widget_payload(1))));
    let flow = widget_flow(Arc::clone(&sdk));

    flow.login(&LoginOptions::default()).await.unwrap();
    let first = sdk.last_callback_name.lock().unwrap().clone().unwrap();
    flow.login(&LoginOptions::default()).await.unwrap();
    let second = sdk.last_callback_name.lock().unwrap().clone().unwrap();
    assert_ne!(first, second);
}

#[tokio::test]
async fn widget_registering_the_wrong_callback_is_rejected() {
    let sdk = Arc::new(MockWidgetSdk::new());
    sdk.echo_callback_name("someone_elses_callback");
    sdk.script(WidgetScript::Deliver(Ok(signed_widget_payload(1))));
    let flow = widget_flow(Arc::clone(&sdk));

    let error = flow.login(&LoginOptions::default()).await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::SdkLoadFailed);
    assert_eq!(sdk.unmount_count(), 1, "widget must be torn down on failure");
}

// test_settings() feeds the coordinator tests; referenced here so the fixture
// stays exercised even when run per-file
#[test]
fn fixture_settings_cover_all_platforms() {
    let settings = test_settings();
    for name in ["google", "kakao", "line", "telegram"] {
        assert!(settings.find_provider(name).is_some());
    }
}
