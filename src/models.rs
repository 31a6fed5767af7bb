//! Core data model shared by all providers
//!
//! Everything the coordinator hands to or receives from a provider flow is one
//! of these types; provider-specific payload shapes live in
//! [`crate::providers`].

use crate::error::AuthError;
use crate::runtime::StateStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum age of a persisted pending flow state; a redirect callback
/// arriving later than this is rejected as a possible replay.
pub const PENDING_STATE_MAX_AGE_MINUTES: i64 = 10;

/// One external identity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Google,
    Kakao,
    Line,
    Telegram,
}

impl Platform {
    pub const ALL: [Self; 4] = [Self::Google, Self::Kakao, Self::Line, Self::Telegram];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Kakao => "kakao",
            Self::Line => "line",
            Self::Telegram => "telegram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unsupported platform names are a programming error at the call site, so
/// parsing fails loudly with the offending name instead of being folded into
/// the `AuthResult` taxonomy.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unsupported platform: {0}")]
pub struct UnsupportedPlatform(pub String);

impl FromStr for Platform {
    type Err = UnsupportedPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "kakao" => Ok(Self::Kakao),
            "line" => Ok(Self::Line),
            "telegram" => Ok(Self::Telegram),
            other => Err(UnsupportedPlatform(other.to_string())),
        }
    }
}

/// How a login flow completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowMode {
    Popup,
    Redirect,
    Widget,
}

/// Per-call login configuration, immutable for the duration of the call
#[derive(Debug, Clone)]
pub struct LoginOptions {
    /// Prefer popup mode where the provider supports it
    pub prefer_popup: bool,
    /// Override the configured redirect URI for redirect-mode flows
    pub redirect_uri: Option<String>,
    /// Additional scopes requested on top of the provider defaults
    pub scopes: Vec<String>,
    /// LINE bot-prompt mode (`normal` or `aggressive`)
    pub bot_prompt: Option<String>,
    /// Telegram widget size hint
    pub widget_size: Option<String>,
}

impl Default for LoginOptions {
    fn default() -> Self {
        Self {
            prefer_popup: true,
            redirect_uri: None,
            scopes: Vec::new(),
            bot_prompt: None,
            widget_size: None,
        }
    }
}

/// Provider-agnostic authenticated identity
///
/// Created only on successful flow completion. Provider-specific extensions
/// (`id_token` and `authorization_code` for code flows, `numeric_id` for the
/// widget provider) stay `None` elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedIdentity {
    pub platform: Platform,
    pub external_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub authorization_code: Option<String>,
    pub numeric_id: Option<i64>,
}

impl AuthenticatedIdentity {
    #[must_use]
    pub fn new(platform: Platform, external_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            platform,
            external_id: external_id.into(),
            email: None,
            display_name: None,
            avatar_url: None,
            access_token: access_token.into(),
            refresh_token: None,
            id_token: None,
            authorization_code: None,
            numeric_id: None,
        }
    }

    /// Merge partial updates into this identity, preserving unspecified fields
    pub fn merge_updates(&mut self, updates: IdentityUpdates) {
        if let Some(email) = updates.email {
            self.email = Some(email);
        }
        if let Some(display_name) = updates.display_name {
            self.display_name = Some(display_name);
        }
        if let Some(avatar_url) = updates.avatar_url {
            self.avatar_url = Some(avatar_url);
        }
        if let Some(access_token) = updates.access_token {
            self.access_token = access_token;
        }
        if let Some(refresh_token) = updates.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
    }
}

/// Partial identity update, applied through
/// [`AuthenticatedIdentity::merge_updates`]
#[derive(Debug, Clone, Default)]
pub struct IdentityUpdates {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Terminal outcome of one logical login call
#[derive(Debug, Clone)]
pub enum AuthResult {
    Success { user: AuthenticatedIdentity },
    Failure { error: AuthError },
}

impl AuthResult {
    #[must_use]
    pub fn platform(&self) -> Platform {
        match self {
            Self::Success { user } => user.platform,
            Self::Failure { error } => error.platform,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub fn user(&self) -> Option<&AuthenticatedIdentity> {
        match self {
            Self::Success { user } => Some(user),
            Self::Failure { .. } => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&AuthError> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error } => Some(error),
        }
    }
}

/// State of one in-flight login attempt
///
/// At most one may be live per provider; starting a new flow invalidates the
/// old one. Redirect-mode flows persist this through a [`StateStore`] so it
/// survives the page navigation; popup and widget flows hold it in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFlowState {
    /// CSRF state value echoed back by the provider
    pub state: String,
    /// Nonce bound into ID tokens for providers that issue them
    pub nonce: String,
    pub created_at: DateTime<Utc>,
    pub mode: FlowMode,
    pub redirect_uri: Option<String>,
}

impl PendingFlowState {
    #[must_use]
    pub fn new(state: String, nonce: String, mode: FlowMode, redirect_uri: Option<String>) -> Self {
        Self {
            state,
            nonce,
            created_at: Utc::now(),
            mode,
            redirect_uri,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() - self.created_at > Duration::minutes(PENDING_STATE_MAX_AGE_MINUTES)
    }

    /// Storage key for a provider's pending state
    #[must_use]
    pub fn storage_key(platform: Platform) -> String {
        format!("authflow.pending.{platform}")
    }

    /// Persist through the navigation-surviving store, replacing any previous
    /// pending state for the same provider.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn persist(&self, store: &dyn StateStore, platform: Platform) -> Result<(), serde_json::Error> {
        let encoded = serde_json::to_string(self)?;
        store.set(&Self::storage_key(platform), &encoded);
        Ok(())
    }

    /// Consume the stored pending state exactly once
    ///
    /// A second call returns `None`, never stale data. Undecodable stored
    /// values are discarded and also yield `None`.
    #[must_use]
    pub fn take(store: &dyn StateStore, platform: Platform) -> Option<Self> {
        let raw = store.remove(&Self::storage_key(platform))?;
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(err) => {
                log::warn!("discarding undecodable pending state for {platform}: {err}");
                None
            }
        }
    }
}

/// Per-provider snapshot for the UI layer
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    pub platform: Platform,
    pub ready: bool,
    pub loading: bool,
    pub authenticated: bool,
    pub user: Option<AuthenticatedIdentity>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MemoryStateStore;

    #[test]
    fn platform_parses_known_names_and_rejects_others() {
        assert_eq!("google".parse::<Platform>().unwrap(), Platform::Google);
        assert_eq!("LINE".parse::<Platform>().unwrap(), Platform::Line);
        let err = "facebook".parse::<Platform>().unwrap_err();
        assert!(err.to_string().contains("facebook"));
    }

    #[test]
    fn merge_updates_preserves_unspecified_fields() {
        let mut identity = AuthenticatedIdentity::new(Platform::Google, "sub-1", "tok-1");
        identity.email = Some("a@example.com".to_string());
        identity.display_name = Some("A".to_string());

        identity.merge_updates(IdentityUpdates {
            display_name: Some("B".to_string()),
            access_token: Some("tok-2".to_string()),
            ..IdentityUpdates::default()
        });

        assert_eq!(identity.email.as_deref(), Some("a@example.com"));
        assert_eq!(identity.display_name.as_deref(), Some("B"));
        assert_eq!(identity.access_token, "tok-2");
        assert_eq!(identity.external_id, "sub-1");
    }

    #[test]
    fn pending_state_round_trips_and_is_consumed_exactly_once() {
        let store = MemoryStateStore::new();
        let pending = PendingFlowState::new(
            "state-123".to_string(),
            "nonce-456".to_string(),
            FlowMode::Redirect,
            Some("https://app.example.com/callback".to_string()),
        );

        pending.persist(&store, Platform::Line).unwrap();
        let restored = PendingFlowState::take(&store, Platform::Line).unwrap();
        assert_eq!(restored, pending);

        // Consumed: a second read returns absent, not stale data.
        assert!(PendingFlowState::take(&store, Platform::Line).is_none());
    }

    #[test]
    fn pending_state_expiry_uses_created_at() {
        let mut pending = PendingFlowState::new(
            "s".to_string(),
            "n".to_string(),
            FlowMode::Redirect,
            None,
        );
        assert!(!pending.is_expired());

        pending.created_at = Utc::now() - Duration::minutes(PENDING_STATE_MAX_AGE_MINUTES + 1);
        assert!(pending.is_expired());
    }

    #[test]
    fn persisting_replaces_previous_pending_state() {
        let store = MemoryStateStore::new();
        let first = PendingFlowState::new("s1".to_string(), "n1".to_string(), FlowMode::Redirect, None);
        let second = PendingFlowState::new("s2".to_string(), "n2".to_string(), FlowMode::Redirect, None);

        first.persist(&store, Platform::Kakao).unwrap();
        second.persist(&store, Platform::Kakao).unwrap();

        let restored = PendingFlowState::take(&store, Platform::Kakao).unwrap();
        assert_eq!(restored.state, "s2");
    }
}
