//! Error taxonomy and classifier
//!
//! Every failure crossing a provider boundary is mapped onto the closed
//! [`ErrorKind`] set before it reaches the retry engine or the circuit breaker,
//! so resilience decisions are deterministic regardless of which SDK produced
//! the original error.

use crate::models::Platform;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed set of error kinds shared by all providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    MissingClientId,
    InvalidConfig,
    NetworkError,
    ApiError,
    UserCancelled,
    AuthorizationFailed,
    InvalidToken,
    SdkLoadFailed,
    SdkNotReady,
    PopupBlocked,
    PopupClosed,
    TimeoutError,
    UnknownError,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingClientId => "MISSING_CLIENT_ID",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::NetworkError => "NETWORK_ERROR",
            Self::ApiError => "API_ERROR",
            Self::UserCancelled => "USER_CANCELLED",
            Self::AuthorizationFailed => "AUTHORIZATION_FAILED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::SdkLoadFailed => "SDK_LOAD_FAILED",
            Self::SdkNotReady => "SDK_NOT_READY",
            Self::PopupBlocked => "POPUP_BLOCKED",
            Self::PopupClosed => "POPUP_CLOSED",
            Self::TimeoutError => "TIMEOUT_ERROR",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Whether the retry engine may spend budget on this kind.
    ///
    /// Transient infrastructure failures are retryable; user decisions and
    /// configuration mistakes are not.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::ApiError | Self::TimeoutError | Self::SdkLoadFailed
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed authentication error, always tagged with the originating platform
#[derive(Debug, Clone, Error)]
#[error("[{platform}] {kind}: {message}")]
pub struct AuthError {
    pub kind: ErrorKind,
    pub message: String,
    pub platform: Platform,
    pub details: Option<serde_json::Value>,
}

impl AuthError {
    pub fn new(kind: ErrorKind, platform: Platform, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            platform,
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Marker error for a completion that arrived after a newer login attempt
    /// superseded it. The coordinator drops these without touching session state.
    #[must_use]
    pub fn stale(platform: Platform) -> Self {
        Self::new(
            ErrorKind::UserCancelled,
            platform,
            "login attempt superseded by a newer one",
        )
        .with_details(serde_json::json!({ "stale": true }))
    }

    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.details
            .as_ref()
            .and_then(|d| d.get("stale"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Classify a structured provider SDK error through the per-provider table
    #[must_use]
    pub fn from_sdk(platform: Platform, err: &SdkError) -> Self {
        let kind = classify_provider_code(platform, &err.code);
        Self::new(
            kind,
            platform,
            err.description.clone().unwrap_or_else(|| err.code.clone()),
        )
        .with_details(serde_json::json!({ "provider_code": err.code }))
    }

    /// Classify a `reqwest` transport or status failure
    #[must_use]
    pub fn from_http(platform: Platform, err: &reqwest::Error) -> Self {
        let kind = if err.is_status() {
            ErrorKind::ApiError
        } else {
            ErrorKind::NetworkError
        };
        Self::new(kind, platform, err.to_string())
    }
}

/// Structured error shape surfaced by provider SDK callbacks
///
/// Providers report failures as short string codes (`popup_closed_by_user`,
/// `access_denied`, ...); the classifier routes these through a per-provider
/// lookup table.
#[derive(Debug, Clone, Error)]
pub struct SdkError {
    pub code: String,
    pub description: Option<String>,
}

impl SdkError {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "{}: {desc}", self.code),
            None => f.write_str(&self.code),
        }
    }
}

/// Map a heterogeneous error onto the closed taxonomy
///
/// Pure function: same input, same output, no side effects. Resolution order:
/// 1. an already-classified [`AuthError`] passes through unchanged (idempotent);
/// 2. a structured [`SdkError`] is routed through the provider lookup table;
/// 3. anything else keeps its display message under `default_kind`.
#[must_use]
pub fn classify(raw: &anyhow::Error, platform: Platform, default_kind: ErrorKind) -> AuthError {
    if let Some(err) = raw.downcast_ref::<AuthError>() {
        return err.clone();
    }
    if let Some(sdk) = raw.downcast_ref::<SdkError>() {
        return AuthError::from_sdk(platform, sdk);
    }
    AuthError::new(default_kind, platform, format!("{raw:#}"))
}

/// Translate a provider error string to an [`ErrorKind`]
///
/// Provider-specific codes come first; codes shared across providers (standard
/// OAuth2 error strings) follow. Unknown strings fall back to `UNKNOWN_ERROR`.
#[must_use]
pub fn classify_provider_code(platform: Platform, code: &str) -> ErrorKind {
    match platform {
        Platform::Google => match code {
            "popup_closed_by_user" | "user_cancel" => return ErrorKind::UserCancelled,
            "popup_blocked_by_browser" | "popup_failed_to_open" => return ErrorKind::PopupBlocked,
            "invalid_client" | "unknown_client_id" => return ErrorKind::MissingClientId,
            _ => {}
        },
        Platform::Kakao => match code {
            "user_cancelled_authorize" | "user_cancelled_login" => {
                return ErrorKind::UserCancelled;
            }
            "popup_blocked" => return ErrorKind::PopupBlocked,
            "misconfigured" | "KOE101" => return ErrorKind::InvalidConfig,
            _ => {}
        },
        Platform::Line => match code {
            "invalid_request" => return ErrorKind::AuthorizationFailed,
            "invalid_grant" => return ErrorKind::InvalidToken,
            _ => {}
        },
        Platform::Telegram => match code {
            "widget_closed" | "user_dismissed" => return ErrorKind::UserCancelled,
            "unauthorized_origin" => return ErrorKind::InvalidConfig,
            _ => {}
        },
    }

    match code {
        "access_denied" | "consent_required" | "interaction_required" => {
            ErrorKind::AuthorizationFailed
        }
        "invalid_token" | "invalid_grant" => ErrorKind::InvalidToken,
        "server_error" | "temporarily_unavailable" => ErrorKind::ApiError,
        "network_error" => ErrorKind::NetworkError,
        "sdk_load_failed" | "script_load_error" => ErrorKind::SdkLoadFailed,
        "sdk_not_ready" => ErrorKind::SdkNotReady,
        "timeout" => ErrorKind::TimeoutError,
        _ => ErrorKind::UnknownError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_passes_auth_error_through_unchanged() {
        let original = AuthError::new(ErrorKind::PopupBlocked, Platform::Google, "blocked")
            .with_details(serde_json::json!({ "provider_code": "popup_blocked_by_browser" }));
        let raw = anyhow::Error::new(original.clone());

        let classified = classify(&raw, Platform::Kakao, ErrorKind::UnknownError);
        assert_eq!(classified.kind, ErrorKind::PopupBlocked);
        assert_eq!(classified.platform, Platform::Google);
        assert_eq!(classified.message, original.message);
    }

    #[test]
    fn classify_routes_sdk_codes_through_provider_table() {
        let raw = anyhow::Error::new(SdkError::new("popup_closed_by_user"));
        let classified = classify(&raw, Platform::Google, ErrorKind::UnknownError);
        assert_eq!(classified.kind, ErrorKind::UserCancelled);

        let raw = anyhow::Error::new(SdkError::new("user_cancelled_authorize"));
        let classified = classify(&raw, Platform::Kakao, ErrorKind::UnknownError);
        assert_eq!(classified.kind, ErrorKind::UserCancelled);

        let raw = anyhow::Error::new(SdkError::new("access_denied"));
        let classified = classify(&raw, Platform::Line, ErrorKind::UnknownError);
        assert_eq!(classified.kind, ErrorKind::AuthorizationFailed);
    }

    #[test]
    fn classify_unknown_code_falls_back_to_unknown() {
        let raw = anyhow::Error::new(SdkError::new("something_nobody_documented"));
        let classified = classify(&raw, Platform::Google, ErrorKind::ApiError);
        assert_eq!(classified.kind, ErrorKind::UnknownError);
    }

    #[test]
    fn classify_unstructured_error_uses_default_kind_and_message() {
        let raw = anyhow::anyhow!("connection reset by peer");
        let classified = classify(&raw, Platform::Line, ErrorKind::NetworkError);
        assert_eq!(classified.kind, ErrorKind::NetworkError);
        assert!(classified.message.contains("connection reset"));
    }

    #[test]
    fn classify_is_deterministic() {
        let raw = anyhow::Error::new(SdkError::new("server_error"));
        let a = classify(&raw, Platform::Kakao, ErrorKind::UnknownError);
        let b = classify(&raw, Platform::Kakao, ErrorKind::UnknownError);
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.message, b.message);
    }

    #[test]
    fn retryable_kinds_match_policy() {
        assert!(ErrorKind::NetworkError.is_retryable());
        assert!(ErrorKind::ApiError.is_retryable());
        assert!(ErrorKind::TimeoutError.is_retryable());
        assert!(ErrorKind::SdkLoadFailed.is_retryable());
        assert!(!ErrorKind::UserCancelled.is_retryable());
        assert!(!ErrorKind::PopupBlocked.is_retryable());
        assert!(!ErrorKind::MissingClientId.is_retryable());
    }

    #[test]
    fn stale_marker_round_trip() {
        let err = AuthError::stale(Platform::Google);
        assert!(err.is_stale());
        let plain = AuthError::new(ErrorKind::UserCancelled, Platform::Google, "cancelled");
        assert!(!plain.is_stale());
    }
}
