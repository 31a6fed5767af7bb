//! Per-provider circuit breaker
//!
//! Gates every login attempt for one provider so a degraded provider SDK fails
//! fast instead of feeding a retry storm. State is owned by exactly one
//! instance per provider and touched only through [`CircuitBreaker::execute`].

use crate::error::{AuthError, ErrorKind};
use crate::models::Platform;
use crate::settings::BreakerSettings;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Breaker phase: CLOSED (normal), OPEN (failing fast), HALF_OPEN (probing)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerPhase {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that flip CLOSED to OPEN
    pub failure_threshold: u32,
    /// How long OPEN fails fast before allowing a HALF_OPEN probe
    pub recovery_timeout: Duration,
    /// Consecutive HALF_OPEN successes that close the breaker
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    #[must_use]
    pub fn from_settings(settings: &BreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            recovery_timeout: Duration::from_secs(settings.recovery_timeout_secs),
            success_threshold: settings.success_threshold,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    phase: BreakerPhase,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_at: Option<Instant>,
}

/// Failure-rate gate for one provider
#[derive(Debug)]
pub struct CircuitBreaker {
    platform: Platform,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(platform: Platform, config: CircuitBreakerConfig) -> Self {
        Self {
            platform,
            config,
            state: Mutex::new(BreakerState {
                phase: BreakerPhase::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure_at: None,
            }),
        }
    }

    #[must_use]
    pub fn phase(&self) -> BreakerPhase {
        self.state.lock().expect("breaker state poisoned").phase
    }

    /// Run `op` through the breaker
    ///
    /// While OPEN inside the recovery window this fails fast with `API_ERROR`
    /// without invoking `op`; the first call after the window runs as a
    /// HALF_OPEN probe.
    ///
    /// # Errors
    ///
    /// Returns the fail-fast error while OPEN, or whatever `op` returns.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AuthError>>,
    {
        self.gate()?;
        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                // A superseded attempt carries no signal about provider
                // health, so it must not count toward opening the circuit.
                if !error.is_stale() {
                    self.on_failure();
                }
                Err(error)
            }
        }
    }

    /// Admit or reject the next call, transitioning OPEN to HALF_OPEN once the
    /// recovery window has elapsed.
    fn gate(&self) -> Result<(), AuthError> {
        let mut state = self.state.lock().expect("breaker state poisoned");
        if state.phase != BreakerPhase::Open {
            return Ok(());
        }

        let elapsed = state.last_failure_at.map_or(Duration::MAX, |at| at.elapsed());
        if elapsed < self.config.recovery_timeout {
            return Err(AuthError::new(
                ErrorKind::ApiError,
                self.platform,
                format!(
                    "{} login temporarily unavailable (circuit open, retry in {}s)",
                    self.platform,
                    (self.config.recovery_timeout - elapsed).as_secs().max(1)
                ),
            ));
        }

        log::info!("[{}] circuit breaker probing recovery (HALF_OPEN)", self.platform);
        state.phase = BreakerPhase::HalfOpen;
        state.consecutive_successes = 0;
        Ok(())
    }

    fn on_success(&self) {
        let mut state = self.state.lock().expect("breaker state poisoned");
        state.consecutive_failures = 0;
        if state.phase == BreakerPhase::HalfOpen {
            state.consecutive_successes += 1;
            if state.consecutive_successes >= self.config.success_threshold {
                log::info!("[{}] circuit breaker closed", self.platform);
                state.phase = BreakerPhase::Closed;
                state.consecutive_successes = 0;
                state.last_failure_at = None;
            }
        }
    }

    fn on_failure(&self) {
        let mut state = self.state.lock().expect("breaker state poisoned");
        state.consecutive_successes = 0;
        state.last_failure_at = Some(Instant::now());
        match state.phase {
            BreakerPhase::HalfOpen => {
                log::warn!("[{}] recovery probe failed, circuit reopened", self.platform);
                state.phase = BreakerPhase::Open;
            }
            BreakerPhase::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.config.failure_threshold {
                    log::warn!(
                        "[{}] {} consecutive failures, circuit opened",
                        self.platform,
                        state.consecutive_failures
                    );
                    state.phase = BreakerPhase::Open;
                }
            }
            BreakerPhase::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            Platform::Kakao,
            CircuitBreakerConfig {
                failure_threshold: 3,
                recovery_timeout: Duration::from_secs(10),
                success_threshold: 2,
            },
        )
    }

    fn failure() -> AuthError {
        AuthError::new(ErrorKind::NetworkError, Platform::Kakao, "down")
    }

    async fn fail(breaker: &CircuitBreaker) {
        let _ = breaker.execute::<(), _, _>(|| async { Err(failure()) }).await;
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_failures_open_the_circuit() {
        let breaker = test_breaker();
        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.phase(), BreakerPhase::Closed);
        fail(&breaker).await;
        assert_eq!(breaker.phase(), BreakerPhase::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_fails_fast_without_invoking_op() {
        let breaker = test_breaker();
        for _ in 0..3 {
            fail(&breaker).await;
        }

        let calls = AtomicU32::new(0);
        let result = breaker
            .execute::<(), _, _>(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.kind, ErrorKind::ApiError);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "wrapped op must not run while open");
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_through_half_open_probes() {
        let breaker = test_breaker();
        for _ in 0..3 {
            fail(&breaker).await;
        }
        assert_eq!(breaker.phase(), BreakerPhase::Open);

        tokio::time::advance(Duration::from_secs(11)).await;

        // First probe after the window runs and succeeds
        breaker.execute(|| async { Ok(()) }).await.unwrap();
        assert_eq!(breaker.phase(), BreakerPhase::HalfOpen);

        // Second consecutive success closes the breaker
        breaker.execute(|| async { Ok(()) }).await.unwrap();
        assert_eq!(breaker.phase(), BreakerPhase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_results_do_not_count_as_failures() {
        let breaker = CircuitBreaker::new(
            Platform::Kakao,
            CircuitBreakerConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_secs(10),
                success_threshold: 2,
            },
        );

        let result = breaker
            .execute::<(), _, _>(|| async { Err(AuthError::stale(Platform::Kakao)) })
            .await;
        assert!(result.unwrap_err().is_stale());
        assert_eq!(breaker.phase(), BreakerPhase::Closed);

        // The provider is still reachable afterwards
        breaker.execute(|| async { Ok(()) }).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens() {
        let breaker = test_breaker();
        for _ in 0..3 {
            fail(&breaker).await;
        }
        tokio::time::advance(Duration::from_secs(11)).await;

        fail(&breaker).await;
        assert_eq!(breaker.phase(), BreakerPhase::Open);

        // And the fast-fail window starts over
        let result = breaker.execute::<(), _, _>(|| async { Ok(()) }).await;
        assert!(result.is_err());
    }
}
