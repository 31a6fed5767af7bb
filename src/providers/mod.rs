//! Provider boundary
//!
//! Capability traits for the vendor SDK surfaces the flows depend on, plus the
//! HTTP halves (profile fetch, token exchange, revocation) implemented against
//! each provider's documented endpoints. The popup/widget UI halves belong to
//! the embedding layer: it supplies the trait implementations.

pub mod google;
pub mod kakao;
pub mod line;
pub mod telegram;
mod traits;

pub use google::GoogleUserinfoClient;
pub use kakao::{KakaoApiClient, KakaoTokenClient};
pub use line::LineTokenClient;
pub use telegram::verify_widget_payload;
pub use traits::{
    CredentialPopupSdk, ExchangedTokens, PopupProbe, PopupRequest, PopupTokenSdk, ProfileApi,
    ProviderProfile, ProviderSdk, TokenExchangeApi, TokenPayload, TokenRequest, WidgetPayload,
    WidgetRequest, WidgetSdk, WidgetSession,
};
