//! Retry harness (spec.md §4.9): exponential backoff with no jitter, driven
//! by an injected [`Clock`] so timing is deterministic and test-observable.
//!
//! Grounded on `graph/state_graph.rs`'s `RetryPolicy::exponential(attempts,
//! initial, max, factor)` doc example, reimplemented against this spec's
//! exact attempt/sleep counting rules.

use std::future::Future;
use std::sync::Arc;

use crate::clock::Clock;

/// Retry policy for a single fallible operation (model invocation, tool call).
#[derive(Clone, Copy, Debug)]
pub enum RetryPolicy {
    /// Invoke once; never retry.
    None,
    /// `maxAttempts == 0` behaves identically to `None` (single attempt).
    ExponentialBackoff {
        initial_ns: u64,
        factor: f64,
        max_attempts: u32,
        max_ns: u64,
    },
}

impl RetryPolicy {
    fn max_attempts(&self) -> u32 {
        match self {
            RetryPolicy::None => 1,
            RetryPolicy::ExponentialBackoff { max_attempts, .. } => (*max_attempts).max(1),
        }
    }
}

/// Run `op` under `policy`, sleeping on `clock` between attempts. `op` is
/// called anew for each attempt since futures aren't replayable.
///
/// Re-raises the last error on exhaustion; returns immediately on the first
/// success.
pub async fn with_retry<F, Fut, T, E>(policy: RetryPolicy, clock: &Arc<dyn Clock>, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts();
    let (mut delay, factor, max_ns) = match policy {
        RetryPolicy::None => (0, 1.0, 0),
        RetryPolicy::ExponentialBackoff {
            initial_ns, factor, max_ns, ..
        } => (initial_ns, factor, max_ns),
    };

    let mut last_err = None;
    for attempt in 0..max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                last_err = Some(err);
                if attempt + 1 < max_attempts {
                    tracing::warn!(attempt, max_attempts, delay_ns = delay.min(max_ns), "retrying after failure");
                    clock.sleep(delay.min(max_ns)).await;
                    delay = ((delay as f64) * factor) as u64;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt was made"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// **Property**: P12 — invoked at most N times; sleep called exactly
    /// N-1 times with monotone non-decreasing durations capped at maxNs.
    #[tokio::test]
    async fn p12_retry_exhaustion_counts() {
        let manual = Arc::new(ManualClock::new());
        let clock: Arc<dyn Clock> = manual.clone();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::ExponentialBackoff {
            initial_ns: 10,
            factor: 2.0,
            max_attempts: 4,
            max_ns: 100,
        };

        let result: Result<(), &str> = with_retry(policy, &clock, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("boom") }
        })
        .await;

        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let sleeps = manual.recorded_sleeps();
        assert_eq!(sleeps.len(), 3);
        assert_eq!(sleeps, vec![10, 20, 40]);
        for pair in sleeps.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
        let result: Result<u32, &str> = with_retry(RetryPolicy::None, &clock, || async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn zero_max_attempts_behaves_as_single_attempt() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::ExponentialBackoff {
            initial_ns: 10,
            factor: 2.0,
            max_attempts: 0,
            max_ns: 100,
        };
        let result: Result<(), &str> = with_retry(policy, &clock, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("boom") }
        })
        .await;
        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
