//! Shared retry-policy abstraction.
//!
//! One policy type serves both retry sites in the system: the generation
//! client (two attempts, no delay between them) and the job queue
//! (three attempts with exponential backoff). The caller supplies a
//! classifier deciding which errors are worth another attempt.

use std::future::Future;
use std::time::Duration;

/// Bounded retry policy: a fixed attempt ceiling and an optional
/// exponential delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Retries immediately, with no delay between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    /// Exponential schedule: `base`, `2*base`, `4*base`, ...
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before re-running after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Runs `op` under the policy, retrying only errors `is_transient` accepts.
///
/// The final error is returned unchanged once attempts are exhausted or a
/// non-transient error is seen.
pub async fn run_with_retry<T, E, Op, Fut, C>(
    policy: RetryPolicy,
    is_transient: C,
    mut op: Op,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_attempts || !is_transient(&err) {
                    return Err(err);
                }
                let delay = policy.delay_after(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn exponential_schedule_doubles() {
        let policy = RetryPolicy::exponential(3, Duration::from_secs(2));
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
    }

    #[test]
    fn immediate_schedule_has_no_delay() {
        let policy = RetryPolicy::immediate(2);
        assert_eq!(policy.delay_after(1), Duration::ZERO);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_ceiling() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = run_with_retry(
            RetryPolicy::immediate(2),
            |_: &&str| true,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom") }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_non_transient_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = run_with_retry(
            RetryPolicy::immediate(3),
            |_: &&str| false,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_on_second_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = run_with_retry(
            RetryPolicy::immediate(2),
            |_: &&str| true,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 { Err("transient") } else { Ok(42) }
                }
            },
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
