//! Guards around external generation providers
//!
//! - [`QuotaTracker`]: persisted monthly budget per provider
//! - [`RateLimiter`]: minimum spacing between calls
//! - [`RetryPolicy`]: backoff for transient failures
//! - [`ProviderGate`]: the three combined; every billable call goes through one

pub mod limiter;
pub mod tracker;

use std::future::Future;
use std::sync::Arc;

use tracing::warn;

use crate::error::Result;

pub use limiter::{RateLimiter, RetryPolicy};
pub use tracker::{current_period, QuotaState, QuotaTracker, UsageRecord, HISTORY_LIMIT};

/// Budget reservation → spacing → retrying call, for one provider
#[derive(Debug, Clone)]
pub struct ProviderGate {
    provider: String,
    limiter: Arc<RateLimiter>,
    quota: Option<Arc<QuotaTracker>>,
    retry: RetryPolicy,
}

impl ProviderGate {
    pub fn new(provider: &str, limiter: Arc<RateLimiter>) -> Self {
        Self {
            provider: provider.to_string(),
            limiter,
            quota: None,
            retry: RetryPolicy::none(),
        }
    }

    #[must_use]
    pub fn with_quota(mut self, quota: Arc<QuotaTracker>) -> Self {
        self.quota = Some(quota);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn quota(&self) -> Option<&QuotaTracker> {
        self.quota.as_deref()
    }

    /// Whether `units` more fit in the budget (always true without a quota)
    pub async fn can_spend(&self, units: u64) -> Result<bool> {
        match &self.quota {
            Some(q) => q.can_spend(units).await,
            None => Ok(true),
        }
    }

    /// Run one billable call costing `units`.
    ///
    /// The units are reserved before `op` runs, so an over-budget call is
    /// rejected before anything is sent. A failed call gives them back.
    pub async fn call<T, F, Fut>(&self, units: u64, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let reservation = match &self.quota {
            Some(quota) => Some(quota.reserve(units, label).await?),
            None => None,
        };

        let limiter = &self.limiter;
        let provider = self.provider.as_str();
        let value = self
            .retry
            .run(label, |_| {
                let fut = op();
                async move {
                    limiter.acquire(provider).await;
                    fut.await
                }
            })
            .await;

        if let (Err(_), Some(quota), Some(held)) = (&value, &self.quota, reservation) {
            if let Err(e) = quota.release(held).await {
                warn!("Quota {}: could not release {units} units: {e}", self.provider);
            }
        }
        value
    }
}
