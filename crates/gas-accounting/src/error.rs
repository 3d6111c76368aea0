//! Error taxonomy for the sync engine
//!
//! Failures local to a single batch or day are absorbed upstream and show up
//! as unsynced days, not as variants here. Only conditions the caller must
//! act on cross the API boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed wallet address, rejected before any network call
    #[error("invalid wallet address: {0}")]
    InvalidAddress(String),

    /// Upstream host returned HTTP 429; recoverable with backoff
    #[error("rate limited by upstream host")]
    RateLimited,

    /// Network failure, timeout or malformed response
    #[error("transport error: {0}")]
    Transport(String),

    /// The foundational signature scan could not complete; the run is aborted
    #[error("sync failed: {0}")]
    SyncFailed(String),

    #[error("cache error: {0}")]
    Cache(#[from] sqlx::Error),

    #[error("invalid date or month: {0}")]
    InvalidDate(String),
}

impl SyncError {
    /// Whether a retry with backoff can plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::RateLimited | SyncError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(SyncError::RateLimited.is_retryable());
        assert!(SyncError::Transport("connection reset".into()).is_retryable());
        assert!(!SyncError::InvalidAddress("xyz".into()).is_retryable());
        assert!(!SyncError::SyncFailed("scan aborted".into()).is_retryable());
        assert!(!SyncError::InvalidDate("2025-13".into()).is_retryable());
    }
}
