//! Bounded retry with backoff.
//!
//! One helper used on both sides of the pipeline: the executor wraps
//! artifact uploads in it, and the client wraps asset-visibility lookups.
//! A policy is (max attempts, backoff), and each call site supplies the
//! predicate deciding which errors are worth another attempt.

use std::future::Future;
use std::time::Duration;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay after every failure.
    Fixed(Duration),
    /// `attempt * step` after the n-th failure (1s, 2s, 3s, ... for a 1s step).
    Linear(Duration),
    /// `initial * multiplier^(attempt-1)`, clamped to `max`.
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Delay to wait after the `attempt`-th failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match *self {
            Self::Fixed(d) => d,
            Self::Linear(step) => step.saturating_mul(attempt),
            Self::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let factor = multiplier.max(1.0).powi(attempt as i32 - 1);
                let ms = (initial.as_millis() as f64 * factor).min(max.as_millis() as f64);
                Duration::from_millis(ms as u64).min(max)
            }
        }
    }
}

/// How many times to try, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(1, Backoff::Fixed(Duration::ZERO))
    }
}

/// Run `op` until it succeeds, returns a non-retryable error, or the
/// attempt budget is spent. The last error is returned on give-up.
pub async fn retry<T, E, F, Fut, P>(policy: &RetryPolicy, is_retryable: P, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                let delay = policy.backoff.delay_for(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Backoff::Fixed(Duration::ZERO))
    }

    #[test]
    fn linear_backoff_grows_with_attempt() {
        let b = Backoff::Linear(Duration::from_secs(1));
        let delays: Vec<u64> = (1..=5).map(|a| b.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn exponential_backoff_clamps_at_max() {
        let b = Backoff::Exponential {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            max: Duration::from_secs(30),
        };
        let delays: Vec<u64> = (1..=8).map(|a| b.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry(&instant(5), |_| true, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err("not yet")
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry(&instant(4), |_| true, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("down") }
        })
        .await;

        assert_eq!(result, Err("down"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry(&instant(10), |e| *e != "fatal", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("fatal") }
        })
        .await;

        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let _: Result<(), &str> = retry(&instant(0), |_| true, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("x") }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
