// Bounded retry policy for polling asynchronous job output
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::constants::{DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_DELAY};

/// Delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// delay = base * factor ^ (attempt - 1), capped at `max`
    Exponential {
        base: Duration,
        factor: u32,
        max: Duration,
    },
}

/// Poll result
#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// A valid value was found on attempt `attempts`
    Ready { value: T, attempts: u32 },
    /// Budget spent without a valid value
    Exhausted { attempts: u32 },
}

/// Retry policy: attempt budget plus backoff
///
/// The first attempt runs immediately. The validity predicate is supplied per
/// poll, so the same policy can guard different kinds of output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_DELAY)
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration, factor: u32, max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Exponential { base, factor, max },
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, factor, max } => {
                let exponent = attempt.saturating_sub(1);
                let multiplier = factor.checked_pow(exponent).unwrap_or(u32::MAX);
                base.checked_mul(multiplier).unwrap_or(max).min(max)
            }
        }
    }

    /// Total worst-case wait between the first and last attempt
    pub fn max_wait(&self) -> Duration {
        (1..self.max_attempts).map(|a| self.delay_after(a)).sum()
    }

    /// Call `fetch` until it yields a value accepted by `is_valid`
    ///
    /// `fetch` receives the 1-based attempt number. No delay follows the last
    /// attempt.
    pub async fn poll<T, F, Fut, V>(&self, mut fetch: F, is_valid: V) -> PollOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Option<T>>,
        V: Fn(&T) -> bool,
    {
        for attempt in 1..=self.max_attempts {
            match fetch(attempt).await {
                Some(value) if is_valid(&value) => {
                    debug!(attempt = attempt, "Poll succeeded");
                    return PollOutcome::Ready {
                        value,
                        attempts: attempt,
                    };
                }
                Some(_) => debug!(attempt = attempt, "Poll found an invalid candidate"),
                None => debug!(attempt = attempt, "Poll found nothing"),
            }

            if attempt < self.max_attempts {
                let delay = self.delay_after(attempt);
                debug!(
                    attempt = attempt,
                    max_attempts = self.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Waiting before next poll"
                );
                tokio::time::sleep(delay).await;
            }
        }

        warn!(attempts = self.max_attempts, "Poll budget exhausted");
        PollOutcome::Exhausted {
            attempts: self.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(5, Duration::from_secs(3));
        assert_eq!(policy.delay_after(1), Duration::from_secs(3));
        assert_eq!(policy.delay_after(4), Duration::from_secs(3));
        assert_eq!(policy.max_wait(), Duration::from_secs(12));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::exponential(
            10,
            Duration::from_millis(100),
            2,
            Duration::from_millis(500),
        );
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
        assert_eq!(policy.delay_after(40), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_exhausts_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(5, Duration::from_secs(3));
        let started = tokio::time::Instant::now();

        let outcome: PollOutcome<u32> = policy
            .poll(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { None }
                },
                |_| true,
            )
            .await;

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 5 });
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(12) && waited < Duration::from_secs(13));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_rejects_invalid_values() {
        let policy = RetryPolicy::fixed(5, Duration::from_secs(1));

        // Attempts 1-2 yield an empty candidate, attempt 3 a valid one
        let outcome = policy
            .poll(
                |attempt| async move { Some(if attempt < 3 { 0 } else { 42 }) },
                |size: &u64| *size > 0,
            )
            .await;

        assert_eq!(outcome, PollOutcome::Ready { value: 42, attempts: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_is_immediate() {
        let policy = RetryPolicy::fixed(5, Duration::from_secs(60));
        let started = tokio::time::Instant::now();

        let outcome = policy.poll(|_| async { Some("ready") }, |_| true).await;

        assert!(matches!(outcome, PollOutcome::Ready { attempts: 1, .. }));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
