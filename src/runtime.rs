//! Environment capability seams
//!
//! The coordinator never touches a browser global directly; navigation and the
//! session-scoped key-value store are injected behind these traits so the core
//! runs identically under a real embedding and under tests. The in-memory
//! implementations are the headless defaults.

use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

/// Session-scoped key-value store surviving a full page navigation
///
/// Redirect-mode flows persist their [`crate::models::PendingFlowState`] here;
/// flows also cache access tokens under `authflow.tokens.{platform}` so the
/// token-purge recovery strategy has something to purge.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    /// Remove and return the previous value, if any
    fn remove(&self, key: &str) -> Option<String>;
}

/// Storage key for a provider's cached access token
#[must_use]
pub fn token_cache_key(platform: crate::models::Platform) -> String {
    format!("authflow.tokens.{platform}")
}

/// In-memory [`StateStore`]
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().expect("state store poisoned").get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .expect("state store poisoned")
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) -> Option<String> {
        self.entries.lock().expect("state store poisoned").remove(key)
    }
}

/// Page-navigation primitive used only by redirect-mode flows
pub trait Navigator: Send + Sync {
    /// Current page URL, including any callback query parameters
    fn current_url(&self) -> Url;
    /// Navigate the whole page away (discards the calling context)
    fn assign(&self, url: Url);
    /// Replace the current history entry without navigating; used to strip
    /// sensitive callback parameters from the visible URL
    fn replace(&self, url: Url);
}

/// In-memory [`Navigator`] tracking assignments instead of navigating
#[derive(Debug)]
pub struct MemoryNavigator {
    current: Mutex<Url>,
    assigned: Mutex<Vec<Url>>,
}

impl MemoryNavigator {
    /// # Panics
    ///
    /// Panics if `initial` is not a valid URL.
    #[must_use]
    pub fn new(initial: &str) -> Self {
        Self {
            current: Mutex::new(Url::parse(initial).expect("invalid initial URL")),
            assigned: Mutex::new(Vec::new()),
        }
    }

    /// Point the navigator at a new current URL, as a real navigation or a
    /// provider redirect would
    ///
    /// # Panics
    ///
    /// Panics if `url` is not a valid URL.
    pub fn set_current(&self, url: &str) {
        *self.current.lock().expect("navigator poisoned") = Url::parse(url).expect("invalid URL");
    }

    /// Most recent full-page navigation target, if any
    #[must_use]
    pub fn last_assigned(&self) -> Option<Url> {
        self.assigned.lock().expect("navigator poisoned").last().cloned()
    }
}

impl Default for MemoryNavigator {
    fn default() -> Self {
        Self::new("https://app.example.com/")
    }
}

impl Navigator for MemoryNavigator {
    fn current_url(&self) -> Url {
        self.current.lock().expect("navigator poisoned").clone()
    }

    fn assign(&self, url: Url) {
        let mut assigned = self.assigned.lock().expect("navigator poisoned");
        assigned.push(url.clone());
        *self.current.lock().expect("navigator poisoned") = url;
    }

    fn replace(&self, url: Url) {
        *self.current.lock().expect("navigator poisoned") = url;
    }
}
