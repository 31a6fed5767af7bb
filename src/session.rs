//! Single-writer session state
//!
//! The coordinator is the only logical writer; provider flows never touch this
//! directly, they return results to the coordinator. All mutation goes through
//! named operations so the container's invariants live in one place.

use crate::error::AuthError;
use crate::models::{AuthenticatedIdentity, Platform};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Reactive login progress snapshot for the UI layer
#[derive(Debug, Clone, Default)]
pub struct LoginState {
    pub is_loading: bool,
    pub platform: Option<Platform>,
    pub error: Option<AuthError>,
}

#[derive(Debug, Default)]
struct SessionState {
    current_user: Option<AuthenticatedIdentity>,
    authenticated_platforms: BTreeSet<Platform>,
    login_state: LoginState,
}

/// Shared handle to the session container
///
/// Clearing the current user deliberately does NOT deauthenticate other
/// platforms; platforms are removed individually by logout.
#[derive(Clone, Default)]
pub struct SessionHandle {
    inner: Arc<Mutex<SessionState>>,
}

impl SessionHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.inner.lock().expect("session state poisoned")
    }

    /// Commit a completed login: the identity becomes the current user and its
    /// platform is marked authenticated; loading state is cleared.
    pub fn set_user(&self, user: AuthenticatedIdentity) {
        let mut state = self.lock();
        state.authenticated_platforms.insert(user.platform);
        state.current_user = Some(user);
        state.login_state = LoginState::default();
    }

    /// Clear only the current user; authenticated platforms are untouched
    pub fn clear_user(&self) {
        self.lock().current_user = None;
    }

    pub fn mark_authenticated(&self, platform: Platform) {
        self.lock().authenticated_platforms.insert(platform);
    }

    /// Remove one platform; if it was the current user's, the current user is
    /// cleared as well.
    pub fn remove_platform(&self, platform: Platform) {
        let mut state = self.lock();
        state.authenticated_platforms.remove(&platform);
        if state.current_user.as_ref().is_some_and(|u| u.platform == platform) {
            state.current_user = None;
        }
    }

    /// Full logout: clears the user, every platform, and loading state
    pub fn clear_all(&self) {
        let mut state = self.lock();
        state.current_user = None;
        state.authenticated_platforms.clear();
        state.login_state = LoginState::default();
    }

    pub fn begin_login(&self, platform: Platform) {
        self.lock().login_state = LoginState {
            is_loading: true,
            platform: Some(platform),
            error: None,
        };
    }

    pub fn fail_login(&self, error: AuthError) {
        self.lock().login_state = LoginState {
            is_loading: false,
            platform: Some(error.platform),
            error: Some(error),
        };
    }

    #[must_use]
    pub fn current_user(&self) -> Option<AuthenticatedIdentity> {
        self.lock().current_user.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self, platform: Platform) -> bool {
        self.lock().authenticated_platforms.contains(&platform)
    }

    #[must_use]
    pub fn authenticated_platforms(&self) -> Vec<Platform> {
        self.lock().authenticated_platforms.iter().copied().collect()
    }

    #[must_use]
    pub fn login_state(&self) -> LoginState {
        self.lock().login_state.clone()
    }
}
