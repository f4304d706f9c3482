//! Bounded retry with exponential backoff.

use anyhow::Result;
use metadata_batch_types::RetryConfig;
use std::future::Future;
use tracing::warn;

/// Runs a fallible async operation up to `max_retries + 1` times.
///
/// After a failed attempt `n` (zero-based) that is not the last, the executor sleeps for
/// `base_delay * 2^n`. The error of the final attempt is returned unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `op`, retrying on error. `label` names the operation in log output.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.config.max_retries => return Err(e),
                Err(e) => {
                    let delay = self.config.delay_for(attempt);
                    attempt += 1;
                    let error = format!("{:#}", e);
                    warn!(
                        operation = label,
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_error() {
        let executor = RetryExecutor::new(RetryConfig::new(3, 100));
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<()> = executor
            .run("fetch", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("attempt {} failed", n))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.unwrap_err().to_string(), "attempt 3 failed");
        // 100 + 200 + 400
        assert_eq!(started.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let executor = RetryExecutor::new(RetryConfig::new(5, 50));
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let value = executor
            .run("submit", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(anyhow!("connection reset"))
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_runs_once_without_sleeping() {
        let executor = RetryExecutor::new(RetryConfig::new(0, 1000));
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<()> = executor
            .run("fetch", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("down"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
