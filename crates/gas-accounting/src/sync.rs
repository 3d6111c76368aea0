//! Sync orchestrator: scan → plan → fetch → aggregate → upsert → read back
//!
//! The per-day staleness plan makes the flow resumable: a crashed or partial
//! run leaves the cache with whatever days completed, and the next run
//! re-plans from the cache and only re-fetches the days that still disagree
//! with the ledger. Stale days are processed sequentially so pacing stays
//! bounded regardless of how many days need work.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use solana_sdk::pubkey::Pubkey;

use crate::aggregate::{DayBucket, aggregate};
use crate::cache::{DayRecord, SyncCache};
use crate::config::Config;
use crate::dates::{day_window, month_days, month_window, parse_month};
use crate::error::SyncError;
use crate::prices::PriceOracle;
use crate::rpc::RpcHandle;
use crate::signatures::{SignaturePaginator, SignatureRecord};
use crate::transactions::TransactionBatcher;

/// One day of the month view, served from cache or freshly synced.
#[derive(Debug, Clone)]
pub struct DayView {
    pub date: NaiveDate,
    pub tx_count: u32,
    pub fee_lamports: u64,
    pub fee_usd: f64,
    pub fee_local: f64,
    /// True when any price behind these totals was a configured default
    pub estimated: bool,
    /// False when this run could not bring the day up to date
    pub synced: bool,
}

/// Per-address month of daily fee totals.
#[derive(Debug)]
pub struct MonthView {
    pub address: String,
    pub days: Vec<DayView>,
    /// True when the scan cap cut the month short; older days may be missing
    pub truncated: bool,
}

#[derive(Debug, Default)]
pub struct MonthTotals {
    pub tx_count: u32,
    pub fee_lamports: u64,
    pub fee_usd: f64,
    pub fee_local: f64,
    pub active_days: usize,
    pub unsynced_days: usize,
    /// Days whose totals include a fallback price or fx rate
    pub estimated_days: usize,
}

impl MonthView {
    /// Month totals over synced days. Unsynced days are excluded from the
    /// sums and counted separately so callers can surface the gap.
    pub fn totals(&self) -> MonthTotals {
        let mut totals = MonthTotals::default();
        for day in &self.days {
            if !day.synced {
                totals.unsynced_days += 1;
                continue;
            }
            if day.tx_count == 0 {
                continue;
            }
            totals.tx_count += day.tx_count;
            totals.fee_lamports += day.fee_lamports;
            totals.fee_usd += day.fee_usd;
            totals.fee_local += day.fee_local;
            totals.active_days += 1;
            if day.estimated {
                totals.estimated_days += 1;
            }
        }
        totals
    }
}

/// What this run needs to do for one day.
enum DayPlan {
    /// Cache already matches the ledger (or the day had no activity)
    Served(DayView),
    /// Cache record missing or its count disagrees with the scan
    Stale,
}

pub struct GasEngine {
    rpc: RpcHandle,
    cache: SyncCache,
    http: reqwest::Client,
    config: Config,
}

impl GasEngine {
    pub fn new(config: &Config, cache: SyncCache) -> Result<Self, SyncError> {
        let rpc = RpcHandle::new(&config.rpc_url, config.call_timeout)?;
        let http = reqwest::Client::builder()
            .timeout(config.call_timeout)
            .build()
            .map_err(|e| SyncError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            rpc,
            cache,
            http,
            config: config.clone(),
        })
    }

    /// Full month flow for one address: one history scan covers the whole
    /// month, then each stale day is re-aggregated and upserted.
    pub async fn month_view(&self, address: &str, month: &str) -> Result<MonthView, SyncError> {
        validate_address(address)?;
        let (year, month_num) = parse_month(month)?;
        let days = month_days(year, month_num);
        let (window_start, window_end) = month_window(year, month_num, self.config.tz)?;

        let oracle = self.oracle_for(window_start, window_end).await;

        println!("[sync] scanning {} for {}", address, month);
        let paginator = SignaturePaginator::new(
            &self.rpc,
            self.config.tz,
            self.config.page_limit,
            self.config.max_signatures,
            self.config.page_delay,
        );
        let scan = paginator
            .fetch(address, window_start, window_end)
            .await
            .map_err(|e| SyncError::SyncFailed(format!("signature scan failed: {}", e)))?;
        if scan.truncated {
            eprintln!(
                "[sync] scan cap hit at {} signatures; older days of {} may be missing",
                self.config.max_signatures, month
            );
        }
        println!("[scan] {} signatures in window", scan.records.len());

        let observed = count_by_day(&scan.records);
        let cached = match (days.first(), days.last()) {
            (Some(&first), Some(&last)) => self.cache.read_range(address, first, last).await?,
            _ => BTreeMap::new(),
        };

        // A truncated scan stopped mid-history, so the oldest day it reached
        // may be missing signatures; its observed count cannot be trusted
        let truncated_boundary = if scan.truncated {
            scan.records.iter().map(|r| r.local_date).min()
        } else {
            None
        };

        // Plan every day up front, then work the stale ones sequentially
        let mut views: BTreeMap<NaiveDate, DayView> = BTreeMap::new();
        let mut stale_days: Vec<NaiveDate> = Vec::new();
        for &date in &days {
            let observed_count = observed.get(&date).copied().unwrap_or(0);
            if truncated_boundary == Some(date) {
                views.insert(date, unsynced_view(date, observed_count));
                continue;
            }
            match plan_day(date, observed_count, cached.get(&date)) {
                DayPlan::Served(view) => {
                    views.insert(date, view);
                }
                DayPlan::Stale => stale_days.push(date),
            }
        }

        if !stale_days.is_empty() {
            println!("[sync] {} stale day(s) to refresh", stale_days.len());
        }
        for date in stale_days {
            let day_sigs: Vec<SignatureRecord> = scan
                .records
                .iter()
                .filter(|r| r.local_date == date)
                .cloned()
                .collect();

            match self.aggregate_and_store(address, date, &day_sigs, &oracle).await {
                Ok(view) => {
                    views.insert(date, view);
                }
                Err(e) => {
                    // The day stays unsynced; the next run will retry it
                    eprintln!("[sync] day {} failed: {}", date, e);
                    views.insert(date, unsynced_view(date, day_sigs.len() as u32));
                }
            }
        }

        Ok(MonthView {
            address: address.to_string(),
            days: views.into_values().collect(),
            truncated: scan.truncated,
        })
    }

    /// Force a single day back through the full pipeline, ignoring the cache.
    pub async fn recompute_day(
        &self,
        address: &str,
        date: NaiveDate,
    ) -> Result<DayView, SyncError> {
        validate_address(address)?;
        let (window_start, window_end) = day_window(date, self.config.tz);

        let oracle = self.oracle_for(window_start, window_end).await;

        let paginator = SignaturePaginator::new(
            &self.rpc,
            self.config.tz,
            self.config.page_limit,
            self.config.max_signatures,
            self.config.page_delay,
        );
        let scan = paginator
            .fetch(address, window_start, window_end)
            .await
            .map_err(|e| SyncError::SyncFailed(format!("signature scan failed: {}", e)))?;

        let day_sigs: Vec<SignatureRecord> = scan
            .records
            .into_iter()
            .filter(|r| r.local_date == date)
            .collect();

        self.aggregate_and_store(address, date, &day_sigs, &oracle)
            .await
    }

    async fn oracle_for(&self, window_start: i64, window_end: i64) -> PriceOracle {
        PriceOracle::for_window(
            &self.http,
            &self.config.price_endpoints,
            self.config.coingecko_api_key.as_deref(),
            window_start,
            window_end,
            self.config.fallback_sol_usd,
            self.config.fallback_fx_rate,
            &self.config.local_currency,
        )
        .await
    }

    /// Fetch bodies for one day, aggregate, and write the record. The stored
    /// count is the number of bodies actually aggregated, so a day with
    /// missing bodies stays stale and gets retried on the next run. The
    /// returned view is built from the record as stored, read back after the
    /// upsert.
    async fn aggregate_and_store(
        &self,
        address: &str,
        date: NaiveDate,
        day_sigs: &[SignatureRecord],
        oracle: &PriceOracle,
    ) -> Result<DayView, SyncError> {
        let (bucket, missing) = if day_sigs.is_empty() {
            (DayBucket::default(), 0)
        } else {
            let batcher = TransactionBatcher::new(
                &self.rpc,
                self.config.batch_size,
                self.config.batch_delay,
            );
            let outcome = batcher.fetch_bodies(day_sigs).await;
            if outcome.missing > 0 {
                eprintln!(
                    "[sync] {}: {} of {} bodies missing; day stays stale",
                    date,
                    outcome.missing,
                    day_sigs.len()
                );
            }

            let buckets = aggregate(&outcome.records, oracle, self.config.tz);
            let bucket = buckets.get(&date).copied().unwrap_or_default();
            (bucket, outcome.missing)
        };

        let fee_local = bucket.fee_usd * oracle.usd_to_local();
        let estimated = bucket.estimated || (bucket.tx_count > 0 && oracle.fx_estimated());

        self.cache
            .upsert(
                address,
                date,
                bucket.tx_count,
                bucket.fee_lamports,
                bucket.fee_usd,
                fee_local,
                estimated,
            )
            .await?;

        let stored = self
            .cache
            .get_day(address, date)
            .await?
            .ok_or_else(|| SyncError::SyncFailed(format!("day {} missing after upsert", date)))?;

        Ok(DayView {
            date: stored.date,
            tx_count: stored.tx_count,
            fee_lamports: stored.fee_lamports,
            fee_usd: stored.fee_usd,
            fee_local: stored.fee_local,
            estimated: stored.estimated,
            synced: missing == 0 && stored.tx_count as usize == day_sigs.len(),
        })
    }
}

/// Base58 pubkey check at the entry point, before any network traffic.
fn validate_address(address: &str) -> Result<(), SyncError> {
    Pubkey::from_str(address)
        .map(|_| ())
        .map_err(|_| SyncError::InvalidAddress(address.to_string()))
}

/// Placeholder view for a day this run could not bring up to date.
fn unsynced_view(date: NaiveDate, observed_count: u32) -> DayView {
    DayView {
        date,
        tx_count: observed_count,
        fee_lamports: 0,
        fee_usd: 0.0,
        fee_local: 0.0,
        estimated: false,
        synced: false,
    }
}

/// Observed on-ledger transaction count per local day.
fn count_by_day(records: &[SignatureRecord]) -> BTreeMap<NaiveDate, u32> {
    let mut counts: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    for record in records {
        *counts.entry(record.local_date).or_default() += 1;
    }
    counts
}

/// Decide whether a day can be served from cache. A day with no observed
/// activity is served as an empty view without touching the cache.
fn plan_day(date: NaiveDate, observed_count: u32, cached: Option<&DayRecord>) -> DayPlan {
    if observed_count == 0 {
        return DayPlan::Served(DayView {
            date,
            tx_count: 0,
            fee_lamports: 0,
            fee_usd: 0.0,
            fee_local: 0.0,
            estimated: false,
            synced: true,
        });
    }

    match cached {
        Some(record) if record.tx_count == observed_count => DayPlan::Served(DayView {
            date,
            tx_count: record.tx_count,
            fee_lamports: record.fee_lamports,
            fee_usd: record.fee_usd,
            fee_local: record.fee_local,
            estimated: record.estimated,
            synced: true,
        }),
        _ => DayPlan::Stale,
    }
}
