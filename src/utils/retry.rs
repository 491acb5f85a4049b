use log::info;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::utils::pacing::pause;

/// Bounded attempts with a fixed delay between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(max_attempts: u32, delay_seconds: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Duration::from_secs(delay_seconds),
        }
    }

    pub fn with_delay(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// The last error seen and how many attempts were spent reaching it.
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Runs `op` until it succeeds, the policy is exhausted, or `is_retryable`
/// rejects an error. `op` receives the 1-based attempt number.
pub async fn retry_with_fixed_delay<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    is_retryable: P,
    mut op: F,
) -> Result<T, RetryFailure<E>>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !is_retryable(&e) || attempt >= policy.max_attempts {
                    return Err(RetryFailure {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                info!(
                    "{}: attempt {}/{} did not succeed ({}), retrying in {:?}",
                    label, attempt, policy.max_attempts, e, policy.delay
                );
                pause(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn instant(attempts: u32) -> RetryPolicy {
        RetryPolicy::with_delay(attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let result: Result<&str, RetryFailure<String>> =
            retry_with_fixed_delay(&instant(3), "test", |_| true, |attempt| {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    if attempt < 3 {
                        Err(format!("boom {}", attempt))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts_and_last_error() {
        let result: Result<(), RetryFailure<String>> =
            retry_with_fixed_delay(&instant(4), "test", |_| true, |attempt| async move {
                Err(format!("boom {}", attempt))
            })
            .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 4);
        assert_eq!(failure.last_error, "boom 4");
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let result: Result<(), RetryFailure<String>> = retry_with_fixed_delay(
            &instant(10),
            "test",
            |e: &String| !e.starts_with("fatal"),
            |_| {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err("fatal".to_string())
                }
            },
        )
        .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::new(0, 5).max_attempts, 1);
    }
}
