//! Bounded exponential-backoff retry engine

use crate::error::{AuthError, ErrorKind};
use crate::settings::RetrySettings;
use rand::Rng;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

/// Upper bound on the random jitter added to every backoff delay
const JITTER_MAX_MS: u64 = 1000;

/// Pure retry configuration; carries no mutable state
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries on top of the initial attempt (`max_retries + 1` total attempts)
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Error kinds worth spending retry budget on
    pub retryable_kinds: HashSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            retryable_kinds: [
                ErrorKind::NetworkError,
                ErrorKind::ApiError,
                ErrorKind::TimeoutError,
                ErrorKind::SdkLoadFailed,
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (0-based), jitter included
    ///
    /// `min(base * multiplier^attempt, max) + jitter(0..=1000ms)`
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let raw_ms = self.base_delay.as_millis() as f64 * factor;
        let capped = Duration::from_millis(raw_ms.min(self.max_delay.as_millis() as f64) as u64)
            .min(self.max_delay);
        let jitter = Duration::from_millis(rand::rng().random_range(0..=JITTER_MAX_MS));
        capped + jitter
    }

    fn is_retryable(&self, error: &AuthError) -> bool {
        self.retryable_kinds.contains(&error.kind)
    }
}

/// Execute `op` with bounded exponential backoff
///
/// Attempts are strictly sequential, never parallel. A non-retryable error
/// aborts after the first attempt without consuming retry budget; exhausting
/// the budget wraps the last error in a message reporting the retry count.
/// The engine does not support external cancellation mid-delay; callers
/// needing cancellation race the whole call against a cancellation signal.
///
/// # Errors
///
/// Returns the first non-retryable error, or the last error once the retry
/// budget is exhausted.
pub async fn retry<T, F, Fut>(op: F, policy: &RetryPolicy) -> Result<T, AuthError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AuthError>>,
{
    retry_with_observer(op, policy, |_, _| {}).await
}

/// [`retry`] with an observability hook invoked before every sleep
///
/// # Errors
///
/// Same contract as [`retry`].
pub async fn retry_with_observer<T, F, Fut, O>(
    mut op: F,
    policy: &RetryPolicy,
    mut on_retry: O,
) -> Result<T, AuthError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AuthError>>,
    O: FnMut(u32, &AuthError),
{
    for attempt in 0..=policy.max_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !policy.is_retryable(&error) {
                    return Err(error);
                }
                if attempt == policy.max_retries {
                    let retries = policy.max_retries;
                    return Err(AuthError {
                        message: format!(
                            "operation failed after {retries} retries: {}",
                            error.message
                        ),
                        ..error
                    });
                }
                let delay = policy.delay_for_attempt(attempt);
                log::debug!(
                    "[{}] attempt {} failed ({}), retrying in {}ms",
                    error.platform,
                    attempt + 1,
                    error.kind,
                    delay.as_millis()
                );
                on_retry(attempt + 1, &error);
                tokio::time::sleep(delay).await;
            }
        }
    }
    unreachable!("retry loop always returns from within")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fail_with(kind: ErrorKind) -> AuthError {
        AuthError::new(kind, Platform::Google, "boom")
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failure_consumes_full_budget() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            ..RetryPolicy::default()
        };

        let result: Result<(), _> = retry(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(fail_with(ErrorKind::NetworkError)) }
            },
            &policy,
        )
        .await;

        let error = result.unwrap_err();
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(error.kind, ErrorKind::NetworkError);
        assert!(error.message.contains("after 3 retries"));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_failure_is_attempted_exactly_once() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 5,
            ..RetryPolicy::default()
        };

        let result: Result<(), _> = retry(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(fail_with(ErrorKind::UserCancelled)) }
            },
            &policy,
        )
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().kind, ErrorKind::UserCancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(5),
            ..RetryPolicy::default()
        };

        let observed = AtomicU32::new(0);
        let result = retry_with_observer(
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(fail_with(ErrorKind::ApiError))
                    } else {
                        Ok("token")
                    }
                }
            },
            &policy,
            |_, _| {
                observed.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await;

        assert_eq!(result.unwrap(), "token");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(observed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn delay_is_capped_and_jittered() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            ..RetryPolicy::default()
        };

        // attempt 0 -> 1s + jitter(0..=1s)
        let d0 = policy.delay_for_attempt(0);
        assert!(d0 >= Duration::from_secs(1) && d0 <= Duration::from_secs(2));

        // far past the cap: 30s + jitter
        let d9 = policy.delay_for_attempt(9);
        assert!(d9 >= Duration::from_secs(30) && d9 <= Duration::from_secs(31));
    }
}
