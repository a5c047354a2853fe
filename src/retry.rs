use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::TaskConfig;
use crate::fetch::FetchError;

/// Bounded attempts with exponential backoff around one task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    pub fn from_task(config: &TaskConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_ms),
            max_delay: Duration::from_millis(config.retry_max_ms),
        }
    }

    /// Pause after the `failed_attempt`-th failure (1-based):
    /// `min(max_delay, base_delay * 2^(failed_attempt - 1))`.
    pub fn backoff_after(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Run `op` until it succeeds or the attempts are used up. `op` receives
    /// the 1-based attempt number. A non-retryable [`FetchError`] anywhere in
    /// the error chain ends the loop early.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> anyhow::Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(task = %label, attempt, max_attempts = max, error = %e, "Attempt failed");
                    if attempt >= max || !is_retryable(&e) {
                        return Err(e.context(format!("{} failed after {} attempt(s)", label, attempt)));
                    }
                    let delay = self.backoff_after(attempt);
                    info!(task = %label, delay_ms = delay.as_millis() as u64, "Retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

fn is_retryable(err: &anyhow::Error) -> bool {
    !err.chain().any(|cause| {
        cause
            .downcast_ref::<FetchError>()
            .is_some_and(|f| !f.is_retryable())
    })
}


#[cfg(test)]
mod proptest_backoff {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn backoff_is_monotonic_and_capped(
            base_ms in 1u64..5_000,
            max_ms in 1u64..120_000,
            attempt in 1u32..64,
        ) {
            let policy = RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_millis(max_ms),
            };
            let here = policy.backoff_after(attempt);
            prop_assert!(here <= policy.max_delay);
            prop_assert!(policy.backoff_after(attempt + 1) >= here);
        }
    }
}
