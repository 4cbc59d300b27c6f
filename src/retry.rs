use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::Retryable;

/// Bounded exponential backoff shared by discovery and page fetches.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(10),
        }
    }
}

impl Backoff {
    /// Delay after the given failed attempt (1-based), jittered by up to 10%
    /// and never above the cap.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = 2u32.saturating_pow(attempt.saturating_sub(1));
        let raw = self.base.saturating_mul(exp).min(self.cap);
        let jitter_ms = (raw.as_millis() / 10) as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        (raw + jitter).min(self.cap)
    }

    /// Run `op` until it succeeds, fails terminally or attempts run out.
    pub async fn retry<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay(attempt);
                    tracing::debug!(
                        "{what}: attempt {attempt}/{} failed ({e}), retrying in {delay:?}",
                        self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
