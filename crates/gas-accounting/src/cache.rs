//! SQLite cache of per-(address, day) fee aggregates
//!
//! Confirmed history for a past day is immutable on this ledger, so a cached
//! day whose stored transaction count matches the freshly observed on-ledger
//! count can be trusted without re-fetching bodies. A count mismatch (or a
//! missing row) marks the day stale. Records are written whole, upserts are
//! idempotent and last-write-wins, and nothing here ever deletes a row.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, SqlitePool};

use crate::error::SyncError;

/// Persisted per-(address, day) aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct DayRecord {
    pub address: String,
    pub date: NaiveDate,
    pub tx_count: u32,
    pub fee_lamports: u64,
    pub fee_usd: f64,
    pub fee_local: f64,
    /// True when any constituent price was a configured default
    pub estimated: bool,
    pub updated_at: String,
}

/// Row type for gas_days queries
#[derive(FromRow)]
struct DayRecordRow {
    address: String,
    date: String,
    tx_count: i64,
    fee_lamports: i64,
    fee_usd: f64,
    fee_local: f64,
    estimated: i64,
    updated_at: String,
}

impl DayRecordRow {
    fn into_record(self) -> Option<DayRecord> {
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").ok()?;
        Some(DayRecord {
            address: self.address,
            date,
            tx_count: self.tx_count as u32,
            fee_lamports: self.fee_lamports as u64,
            fee_usd: self.fee_usd,
            fee_local: self.fee_local,
            estimated: self.estimated != 0,
            updated_at: self.updated_at,
        })
    }
}

/// Cache database wrapper
pub struct SyncCache {
    pool: SqlitePool,
}

impl SyncCache {
    /// Open or create the cache database.
    pub async fn open(path: &Path) -> Result<Self, SyncError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        // WAL mode and a busy timeout prevent SQLITE_BUSY under concurrent
        // upserts for the same key
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout=5000").execute(&pool).await?;

        let cache = Self { pool };
        cache.init_schema().await?;

        Ok(cache)
    }

    /// In-memory cache for tests and dry runs.
    pub async fn open_in_memory() -> Result<Self, SyncError> {
        // A single connection keeps every query on the same :memory: database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let cache = Self { pool };
        cache.init_schema().await?;

        Ok(cache)
    }

    async fn init_schema(&self) -> Result<(), SyncError> {
        sqlx::query(
            "
            -- Per-(address, day) gas fee aggregates
            CREATE TABLE IF NOT EXISTS gas_days (
                address TEXT NOT NULL,
                date TEXT NOT NULL,
                tx_count INTEGER NOT NULL,
                fee_lamports INTEGER NOT NULL,
                fee_usd REAL NOT NULL,
                fee_local REAL NOT NULL,
                estimated INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (address, date)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All cached records for an address within [start, end], keyed by date.
    /// Read-through only — no ledger access.
    pub async fn read_range(
        &self,
        address: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, DayRecord>, SyncError> {
        let rows: Vec<DayRecordRow> = sqlx::query_as(
            "SELECT address, date, tx_count, fee_lamports, fee_usd, fee_local, estimated, updated_at
             FROM gas_days
             WHERE address = ? AND date BETWEEN ? AND ?
             ORDER BY date",
        )
        .bind(address)
        .bind(start.format("%Y-%m-%d").to_string())
        .bind(end.format("%Y-%m-%d").to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(DayRecordRow::into_record)
            .map(|r| (r.date, r))
            .collect())
    }

    /// Single cached record, if present.
    pub async fn get_day(
        &self,
        address: &str,
        date: NaiveDate,
    ) -> Result<Option<DayRecord>, SyncError> {
        let row: Option<DayRecordRow> = sqlx::query_as(
            "SELECT address, date, tx_count, fee_lamports, fee_usd, fee_local, estimated, updated_at
             FROM gas_days
             WHERE address = ? AND date = ?",
        )
        .bind(address)
        .bind(date.format("%Y-%m-%d").to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(DayRecordRow::into_record))
    }

    /// A day is stale when no record exists or the stored transaction count
    /// no longer matches what the ledger shows.
    pub async fn is_stale(
        &self,
        address: &str,
        date: NaiveDate,
        observed_tx_count: u32,
    ) -> Result<bool, SyncError> {
        Ok(match self.get_day(address, date).await? {
            Some(record) => record.tx_count != observed_tx_count,
            None => true,
        })
    }

    /// Idempotent last-write-wins upsert. `updated_at` reflects the most
    /// recent successful write.
    pub async fn upsert(
        &self,
        address: &str,
        date: NaiveDate,
        tx_count: u32,
        fee_lamports: u64,
        fee_usd: f64,
        fee_local: f64,
        estimated: bool,
    ) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO gas_days (address, date, tx_count, fee_lamports, fee_usd, fee_local, estimated)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(address, date) DO UPDATE SET
                 tx_count = excluded.tx_count,
                 fee_lamports = excluded.fee_lamports,
                 fee_usd = excluded.fee_usd,
                 fee_local = excluded.fee_local,
                 estimated = excluded.estimated,
                 updated_at = datetime('now')",
        )
        .bind(address)
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(tx_count as i64)
        .bind(fee_lamports as i64)
        .bind(fee_usd)
        .bind(fee_local)
        .bind(estimated as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[tokio::test]
    async fn upsert_then_read_roundtrips() {
        let cache = SyncCache::open_in_memory().await.unwrap();
        cache
            .upsert(ADDR, day(9), 3, 24_000, 0.0024, 0.0174, false)
            .await
            .unwrap();

        let record = cache.get_day(ADDR, day(9)).await.unwrap().unwrap();
        assert_eq!(record.address, ADDR);
        assert_eq!(record.date, day(9));
        assert_eq!(record.tx_count, 3);
        assert_eq!(record.fee_lamports, 24_000);
        assert!((record.fee_usd - 0.0024).abs() < 1e-12);
        assert!((record.fee_local - 0.0174).abs() < 1e-12);
        assert!(!record.updated_at.is_empty());
    }

    #[tokio::test]
    async fn reapplying_the_same_values_is_idempotent() {
        let cache = SyncCache::open_in_memory().await.unwrap();
        cache
            .upsert(ADDR, day(9), 3, 24_000, 0.0024, 0.0174, false)
            .await
            .unwrap();
        let first = cache.get_day(ADDR, day(9)).await.unwrap().unwrap();

        cache
            .upsert(ADDR, day(9), 3, 24_000, 0.0024, 0.0174, false)
            .await
            .unwrap();
        let second = cache.get_day(ADDR, day(9)).await.unwrap().unwrap();

        assert_eq!(first.tx_count, second.tx_count);
        assert_eq!(first.fee_lamports, second.fee_lamports);
        assert_eq!(first.fee_usd, second.fee_usd);
        assert_eq!(first.fee_local, second.fee_local);
        // updated_at never moves backwards
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn estimate_flag_survives_storage_and_clears_on_rewrite() {
        let cache = SyncCache::open_in_memory().await.unwrap();
        cache
            .upsert(ADDR, day(9), 3, 24_000, 0.00204, 0.0148, true)
            .await
            .unwrap();
        assert!(cache.get_day(ADDR, day(9)).await.unwrap().unwrap().estimated);

        // Re-sync with authoritative prices replaces the estimate
        cache
            .upsert(ADDR, day(9), 3, 24_000, 0.0024, 0.0174, false)
            .await
            .unwrap();
        assert!(!cache.get_day(ADDR, day(9)).await.unwrap().unwrap().estimated);
    }

    #[tokio::test]
    async fn last_write_wins_for_the_same_key() {
        let cache = SyncCache::open_in_memory().await.unwrap();
        cache
            .upsert(ADDR, day(9), 5, 25_000, 0.0025, 0.0181, false)
            .await
            .unwrap();
        cache
            .upsert(ADDR, day(9), 7, 35_000, 0.0035, 0.0254, false)
            .await
            .unwrap();

        let record = cache.get_day(ADDR, day(9)).await.unwrap().unwrap();
        assert_eq!(record.tx_count, 7);
        assert_eq!(record.fee_lamports, 35_000);
    }

    #[tokio::test]
    async fn staleness_tracks_count_mismatches() {
        let cache = SyncCache::open_in_memory().await.unwrap();

        // No record at all: stale
        assert!(cache.is_stale(ADDR, day(9), 5).await.unwrap());

        cache
            .upsert(ADDR, day(9), 5, 25_000, 0.0025, 0.0181, false)
            .await
            .unwrap();
        assert!(!cache.is_stale(ADDR, day(9), 5).await.unwrap());

        // Fresh scan sees more transactions than we stored
        assert!(cache.is_stale(ADDR, day(9), 7).await.unwrap());
    }

    #[tokio::test]
    async fn read_range_is_bounded_and_per_address() {
        let cache = SyncCache::open_in_memory().await.unwrap();
        cache.upsert(ADDR, day(1), 1, 5000, 0.0005, 0.0036, false).await.unwrap();
        cache.upsert(ADDR, day(9), 2, 10_000, 0.0010, 0.0073, false).await.unwrap();
        cache.upsert(ADDR, day(31), 3, 15_000, 0.0015, 0.0109, false).await.unwrap();
        cache
            .upsert("other-address", day(9), 9, 90_000, 0.0090, 0.0653, false)
            .await
            .unwrap();

        let range = cache.read_range(ADDR, day(1), day(9)).await.unwrap();
        assert_eq!(range.len(), 2);
        assert!(range.contains_key(&day(1)));
        assert!(range.contains_key(&day(9)));
        assert_eq!(range[&day(9)].tx_count, 2);
    }
}
