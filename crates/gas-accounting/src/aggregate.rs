//! Per-local-day fee aggregation
//!
//! Fee summation is commutative, so bucket contents are independent of the
//! order bodies came back from the batcher.

use std::collections::BTreeMap;

use chrono::{FixedOffset, NaiveDate};

use crate::constants::LAMPORTS_PER_SOL;
use crate::dates::local_date;
use crate::prices::{PriceOracle, PriceSource};
use crate::transactions::TransactionRecord;

/// Running totals for one local calendar day.
#[derive(Debug, Default, Clone, Copy)]
pub struct DayBucket {
    pub tx_count: u32,
    pub fee_lamports: u64,
    pub fee_usd: f64,
    /// True when any constituent quote came from the fallback price
    pub estimated: bool,
}

/// Fold transaction records into day buckets, pricing each fee at its own
/// timestamp. Records without a timestamp cannot be bucketed and are skipped.
pub fn aggregate(
    records: &[TransactionRecord],
    oracle: &PriceOracle,
    tz: FixedOffset,
) -> BTreeMap<NaiveDate, DayBucket> {
    let mut buckets: BTreeMap<NaiveDate, DayBucket> = BTreeMap::new();

    for record in records {
        let Some(ts) = record.block_time else { continue };
        let Some(date) = local_date(ts, tz) else { continue };

        let quote = oracle.quote_at(Some(ts));
        let fee_sol = record.fee_lamports as f64 / LAMPORTS_PER_SOL as f64;

        let bucket = buckets.entry(date).or_default();
        bucket.tx_count += 1;
        bucket.fee_lamports += record.fee_lamports;
        bucket.fee_usd += fee_sol * quote.usd_per_sol;
        bucket.estimated |= quote.source == PriceSource::Fallback;
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn tx(signature: &str, block_time: Option<i64>, fee_lamports: u64) -> TransactionRecord {
        TransactionRecord {
            signature: signature.to_string(),
            block_time,
            fee_lamports,
            succeeded: true,
        }
    }

    #[test]
    fn sums_fees_for_one_day_at_a_flat_price() {
        // Three transactions on the same local day, flat 100 USD/SOL
        let base = 1741400000;
        let records = vec![
            tx("a", Some(base), 5000),
            tx("b", Some(base + 60), 12000),
            tx("c", Some(base + 120), 7000),
        ];
        let oracle = PriceOracle::with_sources(Vec::new(), Some(100.0), 85.0, 7.25);

        let buckets = aggregate(&records, &oracle, utc());
        assert_eq!(buckets.len(), 1);

        let bucket = buckets.values().next().unwrap();
        assert_eq!(bucket.tx_count, 3);
        assert_eq!(bucket.fee_lamports, 24_000);
        let expected_usd = 24_000.0 / 1e9 * 100.0;
        assert!((bucket.fee_usd - expected_usd).abs() < 1e-12);
        assert!(!bucket.estimated);
    }

    #[test]
    fn splits_buckets_on_local_day_boundaries() {
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        // 15:00 UTC is still the same local day; 17:00 UTC is the next one
        let jul31_utc = 1690815600; // 2023-07-31T15:00:00Z
        let aug1_local = 1690822800; // 2023-07-31T17:00:00Z, Aug 1 at UTC+8
        let records = vec![tx("a", Some(jul31_utc), 5000), tx("b", Some(aug1_local), 5000)];
        let oracle = PriceOracle::with_sources(Vec::new(), Some(100.0), 85.0, 7.25);

        let buckets = aggregate(&records, &oracle, tz);
        assert_eq!(buckets.len(), 2);
        assert!(buckets.contains_key(&NaiveDate::from_ymd_opt(2023, 7, 31).unwrap()));
        assert!(buckets.contains_key(&NaiveDate::from_ymd_opt(2023, 8, 1).unwrap()));
    }

    #[test]
    fn timestamp_less_records_are_excluded() {
        let records = vec![tx("a", None, 5000), tx("b", Some(1741400000), 7000)];
        let oracle = PriceOracle::with_sources(Vec::new(), Some(100.0), 85.0, 7.25);

        let buckets = aggregate(&records, &oracle, utc());
        let bucket = buckets.values().next().unwrap();
        assert_eq!(bucket.tx_count, 1);
        assert_eq!(bucket.fee_lamports, 7000);
    }

    #[test]
    fn fallback_priced_buckets_are_flagged_as_estimates() {
        let records = vec![tx("a", Some(1741400000), 5000)];
        let oracle = PriceOracle::with_sources(Vec::new(), None, 85.0, 7.25);

        let buckets = aggregate(&records, &oracle, utc());
        assert!(buckets.values().next().unwrap().estimated);
    }
}
