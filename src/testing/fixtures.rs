//! Pre-built test data

use crate::models::Platform;
use crate::providers::telegram::payload_signature;
use crate::providers::{ExchangedTokens, ProviderProfile, TokenPayload, WidgetPayload};
use crate::settings::{
    ApplicationSettings, AuthflowSettings, ProviderSettings, RetrySettings,
};
use chrono::Utc;

pub const TEST_BOT_TOKEN: &str = "123456:TEST-BOT-TOKEN";

/// Settings with all four providers configured and aggressive timings so
/// paused-clock tests finish fast
#[must_use]
pub fn test_settings() -> AuthflowSettings {
    let mut settings = AuthflowSettings {
        application: ApplicationSettings {
            redirect_base_url: "https://app.example.com".to_string(),
            login_timeout_secs: 5,
        },
        retry: RetrySettings {
            max_retries: 0,
            base_delay_ms: 10,
            max_delay_ms: 50,
            ..RetrySettings::default()
        },
        ..AuthflowSettings::default()
    };
    settings.providers = vec![
        ProviderSettings {
            name: "google".to_string(),
            scopes: vec!["openid".to_string(), "email".to_string()],
            client_id: Some("google-client".to_string()),
            ..ProviderSettings::default()
        },
        ProviderSettings {
            name: "kakao".to_string(),
            client_id: Some("kakao-client".to_string()),
            client_secret: Some("kakao-secret".to_string()),
            ..ProviderSettings::default()
        },
        ProviderSettings {
            name: "line".to_string(),
            scopes: vec!["profile".to_string(), "openid".to_string()],
            client_id: Some("line-channel".to_string()),
            client_secret: Some("line-secret".to_string()),
            ..ProviderSettings::default()
        },
        ProviderSettings {
            name: "telegram".to_string(),
            bot_token: Some(TEST_BOT_TOKEN.to_string()),
            ..ProviderSettings::default()
        },
    ];
    settings
}

#[must_use]
pub fn profile_for(platform: Platform) -> ProviderProfile {
    ProviderProfile {
        id: format!("{platform}-user-1"),
        email: Some(format!("user@{platform}.example")),
        name: Some("Test User".to_string()),
        picture: None,
    }
}

#[must_use]
pub fn token_payload(access_token: &str) -> TokenPayload {
    TokenPayload {
        access_token: access_token.to_string(),
        expires_in: Some(3600),
    }
}

#[must_use]
pub fn exchanged_tokens(access_token: &str) -> ExchangedTokens {
    ExchangedTokens {
        access_token: access_token.to_string(),
        refresh_token: Some("refresh-1".to_string()),
        id_token: Some("id-token-1".to_string()),
        expires_in: Some(3600),
    }
}

/// Widget payload with a valid signature for [`TEST_BOT_TOKEN`]
#[must_use]
pub fn signed_widget_payload(id: i64) -> WidgetPayload {
    let mut payload = WidgetPayload {
        id,
        first_name: Some("Test".to_string()),
        last_name: None,
        username: Some("testuser".to_string()),
        photo_url: None,
        auth_date: Utc::now().timestamp(),
        hash: None,
    };
    payload.hash = Some(payload_signature(&payload, TEST_BOT_TOKEN));
    payload
}

/// Same payload with the signature stripped, as a forged widget would send
#[must_use]
pub fn unsigned_widget_payload(id: i64) -> WidgetPayload {
    let mut payload = signed_widget_payload(id);
    payload.hash = None;
    payload
}
