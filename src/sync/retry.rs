use std::future::Future;
use std::time::Duration;

use crate::config::SyncTiming;

/// Bounded exponential backoff: `base`, `2 * base`, `4 * base`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl From<&SyncTiming> for RetryPolicy {
    fn from(timing: &SyncTiming) -> Self {
        Self {
            max_retries: timing.max_retries,
            base_delay: Duration::from_millis(timing.retry_base_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << retry.min(16))
    }

    /// Run `op` until it succeeds or the retries are spent; returns the last error.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if retry < self.max_retries => {
                    let delay = self.delay_for(retry);
                    log::warn!(
                        "{} failed (attempt {}): {}; retrying in {:?}",
                        label,
                        retry + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => {
                    log::error!("{} failed after {} attempts: {}", label, retry + 1, e);
                    return Err(e);
                }
            }
        }
    }
}
