// Timeout and retry wrappers for I/O-bound operations
//
// Hardens thumbnailing, optimization and external calls against partial
// failure. `with_timeout` races the operation against a timer without
// cancelling its side effects; `with_retry` re-runs a failed operation
// under a bounded policy.

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, VaultError};

/// Bounded retry policy. `max_retries` counts re-attempts, so an operation
/// runs at most `max_retries + 1` times.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff_multiplier: f64,
    pub exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(250),
            backoff_multiplier: 2.0,
            exponential_backoff: false,
        }
    }
}

impl RetryPolicy {
    /// Wait before attempt number `attempt` (1-based count of re-attempts).
    fn delay_before_attempt(&self, attempt: u32) -> Duration {
        if self.exponential_backoff && attempt > 1 {
            self.retry_delay
                .mul_f64(self.backoff_multiplier.powi(attempt as i32 - 1))
        } else {
            self.retry_delay
        }
    }
}

/// Race `operation` against a deadline.
///
/// The operation is spawned, so on expiry it keeps running to completion
/// on its own (fire and forget) — side effects are not cancelled, the
/// caller just stops waiting. Whichever settles first wins: an operation
/// error before the deadline propagates unchanged.
pub async fn with_timeout<T, F>(label: &str, timeout: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut handle = tokio::spawn(operation);

    tokio::select! {
        joined = &mut handle => match joined {
            Ok(result) => result,
            Err(e) => Err(VaultError::Other(format!("{} task failed: {}", label, e))),
        },
        _ = tokio::time::sleep(timeout) => {
            log::warn!(
                "{} exceeded its {}ms deadline; abandoning the wait",
                label,
                timeout.as_millis()
            );
            Err(VaultError::Timeout {
                label: label.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

/// Run `operation` up to `max_retries + 1` times, waiting between attempts
/// per the policy. Exhaustion wraps the last underlying error.
pub async fn with_retry<T, F, Fut>(label: &str, policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error: Option<VaultError> = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            tokio::time::sleep(policy.delay_before_attempt(attempt)).await;
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                log::warn!(
                    "{} attempt {}/{} failed: {}",
                    label,
                    attempt + 1,
                    policy.max_retries + 1,
                    e
                );
                last_error = Some(e);
            }
        }
    }

    Err(VaultError::RetryExhausted {
        label: label.to_string(),
        retries: policy.max_retries,
        source: Box::new(last_error.unwrap_or_else(|| VaultError::Other("No attempts ran".to_string()))),
    })
}
