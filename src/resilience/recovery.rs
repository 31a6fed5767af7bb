//! Best-effort recovery strategies
//!
//! After retries are exhausted the registry gets exactly one shot at
//! side-effecting remediation (reload a failed SDK, purge stored tokens)
//! before the caller gives up. Recovery itself is never retried.

use crate::error::{AuthError, ErrorKind};
use crate::providers::ProviderSdk;
use crate::runtime::{token_cache_key, StateStore};
use async_trait::async_trait;
use std::sync::Arc;

/// One remediation keyed by the error kinds it can handle
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    /// Short human-readable name for logs
    fn description(&self) -> &'static str;

    fn can_recover(&self, error: &AuthError) -> bool;

    /// Attempt the remediation
    ///
    /// # Errors
    ///
    /// Returns an error if the remediation itself failed; the registry moves
    /// on to the next applicable strategy.
    async fn recover(&self, error: &AuthError) -> anyhow::Result<()>;
}

/// Ordered collection of strategies, tried until the first that completes
#[derive(Default)]
pub struct RecoveryRegistry {
    strategies: Vec<Box<dyn RecoveryStrategy>>,
}

impl RecoveryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strategy: Box<dyn RecoveryStrategy>) {
        self.strategies.push(strategy);
    }

    /// Try each applicable strategy in registration order, stopping at the
    /// first that completes without error. Returns whether any succeeded.
    pub async fn attempt_recovery(&self, error: &AuthError) -> bool {
        for strategy in &self.strategies {
            if !strategy.can_recover(error) {
                continue;
            }
            log::info!(
                "[{}] attempting recovery: {}",
                error.platform,
                strategy.description()
            );
            match strategy.recover(error).await {
                Ok(()) => {
                    log::info!("[{}] recovery succeeded: {}", error.platform, strategy.description());
                    return true;
                }
                Err(err) => {
                    log::warn!(
                        "[{}] recovery step failed ({}): {err:#}",
                        error.platform,
                        strategy.description()
                    );
                }
            }
        }
        false
    }
}

/// Reload a provider SDK whose script failed to load
pub struct SdkReloadStrategy {
    sdks: Vec<Arc<dyn ProviderSdk>>,
}

impl SdkReloadStrategy {
    #[must_use]
    pub fn new(sdks: Vec<Arc<dyn ProviderSdk>>) -> Self {
        Self { sdks }
    }
}

#[async_trait]
impl RecoveryStrategy for SdkReloadStrategy {
    fn description(&self) -> &'static str {
        "reload provider SDK"
    }

    fn can_recover(&self, error: &AuthError) -> bool {
        error.kind == ErrorKind::SdkLoadFailed
            && self.sdks.iter().any(|sdk| sdk.platform() == error.platform)
    }

    async fn recover(&self, error: &AuthError) -> anyhow::Result<()> {
        let sdk = self
            .sdks
            .iter()
            .find(|sdk| sdk.platform() == error.platform)
            .ok_or_else(|| anyhow::anyhow!("no SDK registered for {}", error.platform))?;
        sdk.reload().await?;
        Ok(())
    }
}

/// Purge cached tokens that a provider has rejected
pub struct TokenPurgeStrategy {
    store: Arc<dyn StateStore>,
}

impl TokenPurgeStrategy {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RecoveryStrategy for TokenPurgeStrategy {
    fn description(&self) -> &'static str {
        "purge stored tokens"
    }

    fn can_recover(&self, error: &AuthError) -> bool {
        matches!(
            error.kind,
            ErrorKind::InvalidToken | ErrorKind::AuthorizationFailed
        )
    }

    async fn recover(&self, error: &AuthError) -> anyhow::Result<()> {
        self.store.remove(&token_cache_key(error.platform));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;
    use crate::runtime::MemoryStateStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingStrategy {
        kind: ErrorKind,
        fail: bool,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl RecoveryStrategy for CountingStrategy {
        fn description(&self) -> &'static str {
            "counting"
        }

        fn can_recover(&self, error: &AuthError) -> bool {
            error.kind == self.kind
        }

        async fn recover(&self, _error: &AuthError) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("remediation failed")
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn stops_at_first_successful_strategy() {
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));
        let mut registry = RecoveryRegistry::new();
        registry.register(Box::new(CountingStrategy {
            kind: ErrorKind::InvalidToken,
            fail: false,
            calls: Arc::clone(&first),
        }));
        registry.register(Box::new(CountingStrategy {
            kind: ErrorKind::InvalidToken,
            fail: false,
            calls: Arc::clone(&second),
        }));

        let error = AuthError::new(ErrorKind::InvalidToken, Platform::Line, "rejected");
        assert!(registry.attempt_recovery(&error).await);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_through_failed_strategies() {
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));
        let mut registry = RecoveryRegistry::new();
        registry.register(Box::new(CountingStrategy {
            kind: ErrorKind::InvalidToken,
            fail: true,
            calls: Arc::clone(&first),
        }));
        registry.register(Box::new(CountingStrategy {
            kind: ErrorKind::InvalidToken,
            fail: false,
            calls: Arc::clone(&second),
        }));

        let error = AuthError::new(ErrorKind::InvalidToken, Platform::Line, "rejected");
        assert!(registry.attempt_recovery(&error).await);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reports_failure_when_nothing_applies() {
        let registry = RecoveryRegistry::new();
        let error = AuthError::new(ErrorKind::UserCancelled, Platform::Google, "closed");
        assert!(!registry.attempt_recovery(&error).await);
    }

    #[tokio::test]
    async fn token_purge_clears_cached_token() {
        let store = Arc::new(MemoryStateStore::new());
        store.set(&token_cache_key(Platform::Kakao), "cached-token");

        let strategy = TokenPurgeStrategy::new(Arc::clone(&store) as Arc<dyn StateStore>);
        let error = AuthError::new(ErrorKind::InvalidToken, Platform::Kakao, "rejected");
        assert!(strategy.can_recover(&error));
        strategy.recover(&error).await.unwrap();
        assert!(store.get(&token_cache_key(Platform::Kakao)).is_none());
    }
}
