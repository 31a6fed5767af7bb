//! Cross-cutting reliability primitives
//!
//! The login path composes these as retry(breaker(flow)): the retry engine
//! spends budget only on retryable error kinds, the per-provider circuit
//! breaker bounds the blast radius of a degraded provider, and the recovery
//! registry gets exactly one shot after retries are exhausted.

pub mod breaker;
pub mod recovery;
pub mod retry;

pub use breaker::{BreakerPhase, CircuitBreaker, CircuitBreakerConfig};
pub use recovery::{RecoveryRegistry, RecoveryStrategy, SdkReloadStrategy, TokenPurgeStrategy};
pub use retry::{retry, retry_with_observer, RetryPolicy};
