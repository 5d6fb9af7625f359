//! Retry policy with exponential backoff and an error filter.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Retry policy configuration.
///
/// `max_attempts` counts the first try: a policy of 3 runs the operation at
/// most 3 times, sleeping `base_delay`, then `base_delay * multiplier` in
/// between (capped at `max_delay`). Errors rejected by the filter end the
/// run immediately.
pub struct RetryPolicy<E> {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: u32,
    max_delay: Duration,
    retry_if: fn(&E) -> bool,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for RetryPolicy<E> {}

impl<E> core::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("multiplier", &self.multiplier)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

fn always<E>(_: &E) -> bool {
    true
}

impl<E> RetryPolicy<E> {
    /// Doubling backoff starting at `base_delay`, capped at one minute.
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: 2,
            max_delay: Duration::from_secs(60),
            retry_if: always::<E>,
        }
    }

    /// Run exactly once.
    pub fn no_retry() -> Self {
        Self::exponential(1, Duration::ZERO)
    }

    /// Only errors for which `predicate` returns true are retried.
    pub fn retry_if(mut self, predicate: fn(&E) -> bool) -> Self {
        self.retry_if = predicate;
        self
    }

    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after failed attempt number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.saturating_pow(attempt - 1);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Whether another attempt should follow failed attempt `attempt`.
    pub fn should_retry(&self, attempt: u32, error: &E) -> bool {
        attempt < self.max_attempts && (self.retry_if)(error)
    }

    /// Run `op` until it succeeds, the error is filtered out, or attempts run
    /// out. `op` receives the 1-indexed attempt number. The last error is
    /// returned as-is.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: core::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(attempt, &err) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    debug!(attempt, error = %err, "not retrying");
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    enum Failure {
        Transient,
        Fatal,
    }

    impl core::fmt::Display for Failure {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    fn transient_only(err: &Failure) -> bool {
        *err == Failure::Transient
    }

    #[test]
    fn exponential_backoff_calculates_correctly() {
        let policy = RetryPolicy::<Failure>::exponential(5, Duration::from_millis(100));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(800));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::<Failure>::exponential(40, Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5));

        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(39), Duration::from_secs(5));
    }

    #[test]
    fn should_retry_respects_attempts_and_filter() {
        let policy = RetryPolicy::exponential(3, Duration::from_secs(1)).retry_if(transient_only);

        assert!(policy.should_retry(1, &Failure::Transient));
        assert!(policy.should_retry(2, &Failure::Transient));
        assert!(!policy.should_retry(3, &Failure::Transient));
        assert!(!policy.should_retry(1, &Failure::Fatal));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_backoff_then_succeeds() {
        let policy = RetryPolicy::exponential(3, Duration::from_secs(1)).retry_if(transient_only);
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = policy
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(Failure::Transient)
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts_with_last_error() {
        let policy = RetryPolicy::exponential(3, Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Failure::Transient) }
            })
            .await;

        assert_eq!(result, Err(Failure::Transient));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn filtered_errors_are_not_retried() {
        let policy = RetryPolicy::exponential(3, Duration::from_secs(1)).retry_if(transient_only);
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Failure::Fatal) }
            })
            .await;

        assert_eq!(result, Err(Failure::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
