//! Retry engine with exponential backoff and full jitter (spec §4.5).
//!
//! Generalizes the fixed 2-retries/1s-2s-backoff loop a single HTTP client
//! might hard-code into a reusable policy any adapter can drive with its
//! own retryable-error predicate.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

/// Tunables for [`retry`]. `max_retries` is the number of retries *after*
/// the first attempt, so the thunk runs at most `max_retries + 1` times.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, 200)
    }
}

/// Full-jitter delay for the given zero-based attempt: `random(0, base *
/// 2^attempt)`.
fn jittered_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let cap = policy.base_delay_ms.saturating_mul(1u64 << attempt.min(20));
    let millis = if cap == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=cap)
    };
    Duration::from_millis(millis)
}

/// Run `f` up to `policy.max_retries + 1` times. After each failure, if
/// `retryable(&err)` is true and attempts remain, sleeps a full-jitter
/// backoff and retries; otherwise returns the error immediately.
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy, retryable: impl Fn(&E) -> bool, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(err) => {
                if attempt >= policy.max_retries || !retryable(&err) {
                    return Err(err);
                }
                let delay = jittered_delay(policy, attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, 1);
        let result: Result<u32, &str> = retry(&policy, |_| true, || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err("transient")
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_retrying_when_predicate_rejects() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, 1);
        let result: Result<u32, &str> = retry(&policy, |_| false, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err("permanent")
        })
        .await;
        assert_eq!(result, Err("permanent"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_max_retries() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, 1);
        let result: Result<u32, &str> = retry(&policy, |_| true, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err("always fails")
        })
        .await;
        assert_eq!(result, Err("always fails"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3); // 1 initial + 2 retries
    }
}
