//! Calendar helpers: wallet-local day derivation and month windows
//!
//! Day boundaries are computed at the wallet's configured UTC offset, not
//! UTC, so they line up with the (address, date) key used by the cache.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone};

use crate::error::SyncError;

/// Local calendar date for a unix timestamp at the wallet's offset.
pub fn local_date(block_time: i64, tz: FixedOffset) -> Option<NaiveDate> {
    DateTime::from_timestamp(block_time, 0).map(|dt| dt.with_timezone(&tz).date_naive())
}

/// Parse "YYYY-MM" into (year, month).
pub fn parse_month(s: &str) -> Result<(i32, u32), SyncError> {
    let invalid = || SyncError::InvalidDate(s.to_string());
    let (y, m) = s.split_once('-').ok_or_else(invalid)?;
    let year: i32 = y.parse().map_err(|_| invalid())?;
    let month: u32 = m.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok((year, month))
}

/// Every calendar day of a month, in order.
pub fn month_days(year: i32, month: u32) -> Vec<NaiveDate> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };
    first.iter_days().take_while(|d| d.month() == month).collect()
}

/// Unix window [start, end] covering one local calendar day.
pub fn day_window(date: NaiveDate, tz: FixedOffset) -> (i64, i64) {
    let start = tz
        .from_local_datetime(&date.and_hms_opt(0, 0, 0).unwrap())
        .unwrap()
        .timestamp();
    let end = tz
        .from_local_datetime(&date.and_hms_opt(23, 59, 59).unwrap())
        .unwrap()
        .timestamp();
    (start, end)
}

/// Unix window [start, end] covering the whole month in local time.
pub fn month_window(year: i32, month: u32, tz: FixedOffset) -> Result<(i64, i64), SyncError> {
    let days = month_days(year, month);
    match (days.first(), days.last()) {
        (Some(&first), Some(&last)) => {
            let (start, _) = day_window(first, tz);
            let (_, end) = day_window(last, tz);
            Ok((start, end))
        }
        _ => Err(SyncError::InvalidDate(format!("{:04}-{:02}", year, month))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn utc_plus_8() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    #[test]
    fn parses_valid_months_and_rejects_garbage() {
        assert_eq!(parse_month("2025-03").unwrap(), (2025, 3));
        assert_eq!(parse_month("2024-12").unwrap(), (2024, 12));
        assert!(parse_month("2025-13").is_err());
        assert!(parse_month("2025").is_err());
        assert!(parse_month("march-2025").is_err());
    }

    #[test]
    fn month_days_handles_lengths_and_leap_years() {
        assert_eq!(month_days(2025, 1).len(), 31);
        assert_eq!(month_days(2025, 2).len(), 28);
        assert_eq!(month_days(2024, 2).len(), 29);
        assert_eq!(month_days(2025, 4).len(), 30);
        assert!(month_days(2025, 13).is_empty());
    }

    #[test]
    fn local_date_shifts_across_utc_midnight() {
        // 17:00 UTC on Jul 31 is already Aug 1 at UTC+8
        let ts = Utc
            .with_ymd_and_hms(2023, 7, 31, 17, 0, 0)
            .unwrap()
            .timestamp();
        assert_eq!(
            local_date(ts, utc_plus_8()).unwrap(),
            NaiveDate::from_ymd_opt(2023, 8, 1).unwrap()
        );

        // Same instant in UTC terms stays on Jul 31
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(
            local_date(ts, utc).unwrap(),
            NaiveDate::from_ymd_opt(2023, 7, 31).unwrap()
        );
    }

    #[test]
    fn day_window_spans_exactly_one_day() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        let (start, end) = day_window(day, utc_plus_8());
        assert_eq!(end - start, 86_399);
        assert_eq!(local_date(start, utc_plus_8()).unwrap(), day);
        assert_eq!(local_date(end, utc_plus_8()).unwrap(), day);
    }

    #[test]
    fn month_window_covers_first_through_last_day() {
        let tz = utc_plus_8();
        let (start, end) = month_window(2025, 2, tz).unwrap();
        assert_eq!(
            local_date(start, tz).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()
        );
        assert_eq!(
            local_date(end, tz).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()
        );
        assert!(month_window(2025, 0, tz).is_err());
    }
}
