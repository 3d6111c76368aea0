//! Shared retry/backoff policy for upstream calls
//!
//! One policy object per call kind replaces per-site retry loops. Rate-limit
//! responses back off longer than plain transport failures, and every attempt
//! runs under the policy's timeout.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::constants;
use crate::error::SyncError;

/// Retry parameters for one kind of upstream call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Base delay before retrying a transport failure (linear backoff)
    pub base_delay: Duration,
    /// Base delay before retrying a rate-limited call (linear backoff)
    pub rate_limit_delay: Duration,
    /// Per-attempt deadline
    pub timeout: Duration,
}

impl RetryPolicy {
    /// getSignaturesForAddress pages — exhausting this aborts the whole run
    pub fn scan_page() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            rate_limit_delay: Duration::from_millis(800),
            timeout: Duration::from_secs(constants::CALL_TIMEOUT_SECS),
        }
    }

    /// getTransaction within a batch — exhausting this drops one signature
    pub fn batch_item() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            rate_limit_delay: Duration::from_millis(800),
            timeout: Duration::from_secs(constants::CALL_TIMEOUT_SECS),
        }
    }

    /// Price and exchange-rate lookups — exhausting this degrades to fallback
    pub fn price_lookup() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            rate_limit_delay: Duration::from_secs(2),
            timeout: Duration::from_secs(constants::CALL_TIMEOUT_SECS),
        }
    }

    /// Sleep before retry number `attempt` (1-based) of a failed call
    async fn backoff(&self, attempt: u32, err: &SyncError) {
        let base = if matches!(err, SyncError::RateLimited) {
            self.rate_limit_delay
        } else {
            self.base_delay
        };
        sleep(base * attempt).await;
    }
}

/// Drive `op` under `policy`: each attempt runs against the policy timeout,
/// retryable errors back off and retry, everything else surfaces immediately.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut attempt = 0;
    loop {
        let result = match timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Transport(format!(
                "call timed out after {:?}",
                policy.timeout
            ))),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
                attempt += 1;
                policy.backoff(attempt, &e).await;
            }
            Err(e) => return Err(e),
        }
    }
}
