//! Consent-widget login flow (telegram)
//!
//! Mounts the widget with a one-shot callback named uniquely per flow
//! generation, races payload delivery against dismissal and the login timeout,
//! verifies the payload's authenticity marker and recency, and tears the
//! widget down on every exit path.

use crate::error::{AuthError, ErrorKind};
use crate::flows::{FlowCore, FlowOutcome, FlowState, LoginFlow};
use crate::models::{AuthenticatedIdentity, LoginOptions, Platform};
use crate::providers::{verify_widget_payload, WidgetPayload, WidgetRequest, WidgetSdk};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub struct WidgetFlow {
    core: FlowCore,
    sdk: Arc<dyn WidgetSdk>,
    bot_token: String,
    timeout: Duration,
}

impl WidgetFlow {
    #[must_use]
    pub fn new(sdk: Arc<dyn WidgetSdk>, bot_token: String, timeout: Duration) -> Self {
        Self {
            core: FlowCore::new(Platform::Telegram),
            sdk,
            bot_token,
            timeout,
        }
    }

    async fn run(&self, options: &LoginOptions, generation: u64) -> Result<FlowOutcome, AuthError> {
        self.sdk.ensure_ready().await?;

        let callback_name = format!("authflow_widget_cb_{generation}");
        let session = self
            .sdk
            .mount(WidgetRequest {
                callback_name: callback_name.clone(),
                size: options.widget_size.clone(),
            })
            .await?;
        if session.callback_name != callback_name {
            // A stale registration would deliver into a dead callback
            self.sdk.unmount().await;
            return Err(AuthError::new(
                ErrorKind::SdkLoadFailed,
                Platform::Telegram,
                format!(
                    "widget registered callback {} instead of {callback_name}",
                    session.callback_name
                ),
            ));
        }
        self.core.set_state(FlowState::WidgetPending);

        let delivered = tokio::select! {
            delivered = session.completion => delivered,
            () = tokio::time::sleep(self.timeout) => {
                self.sdk.unmount().await;
                return Err(AuthError::new(
                    ErrorKind::TimeoutError,
                    Platform::Telegram,
                    format!("login timed out after {}s", self.timeout.as_secs()),
                ));
            }
        };
        // The rendered surface never outlives the attempt
        self.sdk.unmount().await;

        let payload = match delivered {
            Ok(Ok(payload)) => payload,
            Ok(Err(sdk_error)) => return Err(AuthError::from_sdk(Platform::Telegram, &sdk_error)),
            Err(_closed) => {
                return Err(AuthError::new(
                    ErrorKind::UnknownError,
                    Platform::Telegram,
                    "widget dropped its callback without delivering a result",
                ));
            }
        };

        verify_widget_payload(&payload, &self.bot_token)?;
        Ok(FlowOutcome::Completed(Self::identity_from(payload)))
    }

    fn identity_from(payload: WidgetPayload) -> AuthenticatedIdentity {
        let display_name = match (&payload.first_name, &payload.last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => payload.username.clone(),
        };

        // The signed hash is the credential this provider issues
        let access_token = payload.hash.clone().unwrap_or_default();
        let mut identity =
            AuthenticatedIdentity::new(Platform::Telegram, payload.id.to_string(), access_token);
        identity.display_name = display_name;
        identity.avatar_url = payload.photo_url;
        identity.numeric_id = Some(payload.id);
        identity
    }
}

#[async_trait]
impl LoginFlow for WidgetFlow {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    fn state(&self) -> FlowState {
        self.core.state()
    }

    async fn ready(&self) -> bool {
        self.sdk.is_ready().await
    }

    async fn login(&self, options: &LoginOptions) -> Result<FlowOutcome, AuthError> {
        let generation = self.core.begin();
        let result = self.run(options, generation).await;
        self.core.finish(generation, result)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.sdk.sign_out().await
    }
}
