//! Signature history pagination (newest-to-oldest, windowed)
//!
//! Walks an address's transaction signatures backward in time with a
//! "before" cursor until the window start is passed, history is exhausted,
//! or the per-run cap is reached. Cursors reference immutable historical
//! ledger state, so a retried walk can resume from the last good cursor.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use chrono::{FixedOffset, NaiveDate};
use tokio::time::sleep;

use crate::dates::local_date;
use crate::error::SyncError;
use crate::retry::RetryPolicy;
use crate::rpc::{RpcHandle, SignatureInfo};

/// Anything that can serve pages of signature history, newest first.
pub trait SignatureSource {
    fn signatures_page(
        &self,
        policy: &RetryPolicy,
        address: &str,
        limit: usize,
        before: Option<&str>,
    ) -> impl Future<Output = Result<Vec<SignatureInfo>, SyncError>>;
}

impl SignatureSource for RpcHandle {
    async fn signatures_page(
        &self,
        policy: &RetryPolicy,
        address: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<SignatureInfo>, SyncError> {
        self.get_signatures_page(policy, address, limit, before).await
    }
}

/// One windowed signature observation; lives for a single sync run.
#[derive(Debug, Clone)]
pub struct SignatureRecord {
    pub signature: String,
    pub block_time: i64,
    pub local_date: NaiveDate,
}

/// Result of a full window scan.
#[derive(Debug, Default)]
pub struct SignatureScan {
    /// Newest-to-oldest, deduplicated, already time-filtered
    pub records: Vec<SignatureRecord>,
    /// True when the cap stopped the walk before history was exhausted
    pub truncated: bool,
}

pub struct SignaturePaginator<'a, S> {
    rpc: &'a S,
    tz: FixedOffset,
    page_limit: usize,
    max_count: usize,
    page_delay: Duration,
}

impl<'a, S: SignatureSource> SignaturePaginator<'a, S> {
    pub fn new(
        rpc: &'a S,
        tz: FixedOffset,
        page_limit: usize,
        max_count: usize,
        page_delay: Duration,
    ) -> Self {
        Self {
            rpc,
            tz,
            page_limit,
            max_count,
            page_delay,
        }
    }

    /// Scan the address's history for `[window_start, window_end]`.
    /// Terminates on a short page, on the first signature older than the
    /// window, or when the cap is hit.
    pub async fn fetch(
        &self,
        address: &str,
        window_start: i64,
        window_end: i64,
    ) -> Result<SignatureScan, SyncError> {
        let policy = RetryPolicy::scan_page();
        let mut scan = SignatureScan::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut before: Option<String> = None;

        loop {
            let page = self
                .rpc
                .signatures_page(&policy, address, self.page_limit, before.as_deref())
                .await?;
            if page.is_empty() {
                break;
            }

            let (kept, reached_start) = filter_page(&page, window_start, window_end, self.tz);
            for record in kept {
                if scan.records.len() >= self.max_count {
                    scan.truncated = true;
                    break;
                }
                if seen.insert(record.signature.clone()) {
                    scan.records.push(record);
                }
            }

            if reached_start || scan.truncated || page.len() < self.page_limit {
                break;
            }

            before = page.last().map(|s| s.signature.clone());
            sleep(self.page_delay).await;
        }

        Ok(scan)
    }
}

/// Window-filter one page. Entries without a timestamp advance pagination
/// but are never emitted. Returns the kept records and whether the page
/// walked past the window start.
fn filter_page(
    page: &[SignatureInfo],
    window_start: i64,
    window_end: i64,
    tz: FixedOffset,
) -> (Vec<SignatureRecord>, bool) {
    let mut kept = Vec::new();
    let mut reached_start = false;

    for info in page {
        let Some(ts) = info.block_time else { continue };
        if ts < window_start {
            reached_start = true;
            break;
        }
        if ts <= window_end
            && let Some(date) = local_date(ts, tz)
        {
            kept.push(SignatureRecord {
                signature: info.signature.clone(),
                block_time: ts,
                local_date: date,
            });
        }
    }

    (kept, reached_start)
}
