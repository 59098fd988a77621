//! Minimum spacing between calls to the same provider, plus retry backoff.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::Result;

/// Per-provider call spacing
///
/// A caller that arrives early reserves the next free slot before sleeping,
/// so concurrent callers queue up one interval apart instead of bunching.
#[derive(Debug, Default)]
pub struct RateLimiter {
    intervals: HashMap<String, Duration>,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum interval for one provider
    #[must_use]
    pub fn with_interval(mut self, provider: &str, interval: Duration) -> Self {
        self.intervals.insert(provider.to_string(), interval);
        self
    }

    /// Configured interval; zero for unknown providers
    pub fn interval(&self, provider: &str) -> Duration {
        self.intervals.get(provider).copied().unwrap_or_default()
    }

    /// Wait until `provider` may be called again. Returns how long we waited.
    pub async fn acquire(&self, provider: &str) -> Duration {
        let interval = self.interval(provider);
        let now = Instant::now();

        let slot = {
            let mut slots = self.next_slot.lock().await;
            let slot = slots.get(provider).copied().filter(|s| *s > now).unwrap_or(now);
            slots.insert(provider.to_string(), slot + interval);
            slot
        };

        let wait = slot.saturating_duration_since(now);
        if !wait.is_zero() {
            debug!("Rate limit {provider}: waiting {:.1}s", wait.as_secs_f64());
            tokio::time::sleep_until(slot).await;
        }
        wait
    }
}

/// Exponential backoff for transient failures (base, base×4, base×16, ...)
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            factor: 4,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            factor: 1,
        }
    }

    /// Delay before attempt `attempt` (0-based; attempt 0 has none)
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay * self.factor.saturating_pow(attempt - 1)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    /// Quota rejections and other non-transient errors return immediately.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let delay = self.delay(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    warn!("{what} failed (attempt {}/{}): {e}", attempt + 1, self.max_attempts);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
