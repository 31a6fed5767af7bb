//! Per-provider login state machines
//!
//! All four flows share one state-machine shape:
//!
//! `IDLE → INITIALIZING → (POPUP_PENDING | REDIRECTING | WIDGET_PENDING) →
//! COMPLETED | FAILED | CANCELLED`
//!
//! `IDLE` and the terminal states allow a new flow to start; starting a login
//! while another is pending invalidates the older attempt's pending state and
//! bumps the flow generation, so the older completion is discarded as stale
//! instead of being committed.

pub mod credential;
pub mod popup;
pub mod redirect;
pub mod widget;

pub use credential::CredentialPopupFlow;
pub use popup::PopupTokenFlow;
pub use redirect::RedirectCodeFlow;
pub use widget::WidgetFlow;

use crate::error::AuthError;
use crate::models::{AuthenticatedIdentity, LoginOptions, PendingFlowState, Platform};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

/// Delay before the single popup-liveness check. Most popup SDKs expose no
/// closed event, so one delayed poll approximates it; a callback arriving just
/// after the poll loses the race and is reported as cancelled.
pub const POPUP_CLOSE_CHECK_DELAY: Duration = Duration::from_secs(1);

/// Machine state of one provider's login flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Initializing,
    PopupPending,
    Redirecting,
    WidgetPending,
    Completed,
    Failed,
    Cancelled,
}

impl FlowState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// How one `login()` call ended from the flow's perspective
#[derive(Debug, Clone)]
pub enum FlowOutcome {
    Completed(AuthenticatedIdentity),
    /// The page is navigating away; the result surfaces through
    /// `handle_redirect_callback` on the next load
    RedirectPending,
}

/// Uniform interface the coordinator drives
#[async_trait]
pub trait LoginFlow: Send + Sync {
    fn platform(&self) -> Platform;

    fn state(&self) -> FlowState;

    /// Whether the underlying SDK is loaded and usable
    async fn ready(&self) -> bool;

    /// Run one login attempt to completion (or to navigation for redirect mode)
    ///
    /// # Errors
    ///
    /// Returns a classified [`AuthError`]; never panics for flow failures.
    async fn login(&self, options: &LoginOptions) -> Result<FlowOutcome, AuthError>;

    /// Whether the current URL looks like this provider's redirect callback
    fn is_callback_url(&self, url: &Url) -> bool {
        let _ = url;
        false
    }

    /// Resume a redirect-mode flow after navigation back
    ///
    /// # Errors
    ///
    /// Returns `INVALID_CONFIG` for providers without a redirect mode.
    async fn handle_redirect_callback(&self) -> Result<FlowOutcome, AuthError> {
        Err(AuthError::new(
            crate::error::ErrorKind::InvalidConfig,
            self.platform(),
            "provider has no redirect callback",
        ))
    }

    /// Provider-local sign-out, best effort
    ///
    /// # Errors
    ///
    /// Returns an error the coordinator logs and swallows.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// State shared by every flow implementation: machine state, the flow
/// generation counter, and the in-memory pending slot for popup/widget modes.
pub(crate) struct FlowCore {
    platform: Platform,
    state: Mutex<FlowState>,
    generation: AtomicU64,
    pending: Mutex<Option<PendingFlowState>>,
}

impl FlowCore {
    pub(crate) fn new(platform: Platform) -> Self {
        Self {
            platform,
            state: Mutex::new(FlowState::Idle),
            generation: AtomicU64::new(0),
            pending: Mutex::new(None),
        }
    }

    pub(crate) fn platform(&self) -> Platform {
        self.platform
    }

    pub(crate) fn state(&self) -> FlowState {
        *self.state.lock().expect("flow state poisoned")
    }

    pub(crate) fn set_state(&self, state: FlowState) {
        *self.state.lock().expect("flow state poisoned") = state;
    }

    /// Start a new attempt: invalidate any stale pending state, bump the
    /// generation, and move to INITIALIZING. Returns this attempt's generation.
    pub(crate) fn begin(&self) -> u64 {
        let previous = self.state();
        if !matches!(previous, FlowState::Idle) && !previous.is_terminal() {
            log::info!(
                "[{}] new login invalidates pending attempt in state {previous:?}",
                self.platform
            );
        }
        self.pending.lock().expect("flow pending poisoned").take();
        self.set_state(FlowState::Initializing);
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether `generation` is still the live attempt
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    pub(crate) fn store_pending(&self, pending: PendingFlowState) {
        *self.pending.lock().expect("flow pending poisoned") = Some(pending);
    }

    pub(crate) fn take_pending(&self) -> Option<PendingFlowState> {
        self.pending.lock().expect("flow pending poisoned").take()
    }

    /// Settle this attempt: records the terminal state only when `generation`
    /// is still current, and maps a finished result through the staleness
    /// check. Stale completions are converted into the stale marker error and
    /// never reported as this flow's terminal state.
    pub(crate) fn finish(
        &self,
        generation: u64,
        result: Result<FlowOutcome, AuthError>,
    ) -> Result<FlowOutcome, AuthError> {
        if !self.is_current(generation) {
            log::info!(
                "[{}] discarding stale completion from superseded attempt",
                self.platform
            );
            return Err(AuthError::stale(self.platform));
        }
        self.take_pending();
        match &result {
            Ok(FlowOutcome::Completed(_)) => self.set_state(FlowState::Completed),
            Ok(FlowOutcome::RedirectPending) => self.set_state(FlowState::Redirecting),
            Err(error) if error.kind == crate::error::ErrorKind::UserCancelled => {
                self.set_state(FlowState::Cancelled);
            }
            Err(_) => self.set_state(FlowState::Failed),
        }
        result
    }
}
