//! Distributes a record total across calendar-month time buckets.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::error::{PipelineError, Result};

/// A contiguous time window with a record count assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBucket {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub count: u64,
}

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    // from_ymd_opt with day 1 cannot fail for a date that already exists
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .unwrap_or(date)
}

/// First day of the month after the one containing `date`.
pub fn next_month_start(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

/// Split `total` records across the calendar months of `[start, end]`.
///
/// Without both bounds the whole total lands in a single degenerate bucket
/// at the current instant. With bounds, each calendar month touched by the
/// range becomes a bucket, clipped to the requested days at the edges;
/// division is floor-based with the remainder spread over the earliest
/// months, and empty buckets are dropped.
pub fn monthly_distribution(
    total: u64,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Vec<TimeBucket>> {
    let (start, end) = match (start, end) {
        (Some(s), Some(e)) => (s, e),
        _ => {
            let now = Utc::now().naive_utc();
            return Ok(vec![TimeBucket {
                start: now,
                end: now,
                count: total,
            }]);
        }
    };

    if start > end {
        return Err(PipelineError::InvalidRange { start, end });
    }

    let day_open = NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default();
    let day_close = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default();

    // Enumerate the months the range touches, clipping the first and last
    // windows to the requested days.
    let mut windows: Vec<(NaiveDate, NaiveDate)> = Vec::new();
    let mut cursor = month_start(start);
    while cursor <= end {
        let month_end = next_month_start(cursor).pred_opt().unwrap_or(cursor);
        let window_start = cursor.max(start);
        let window_end = month_end.min(end);
        windows.push((window_start, window_end));
        cursor = next_month_start(cursor);
    }

    let months = windows.len() as u64;
    let base = total / months;
    let remainder = total % months;

    let buckets = windows
        .into_iter()
        .enumerate()
        .map(|(i, (window_start, window_end))| {
            let count = base + if (i as u64) < remainder { 1 } else { 0 };
            TimeBucket {
                start: window_start.and_time(day_open),
                end: window_end.and_time(day_close),
                count,
            }
        })
        .filter(|bucket| bucket.count > 0)
        .collect();

    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn missing_bound_yields_single_now_bucket() {
        let buckets = monthly_distribution(42, Some(date(2024, 1, 1)), None).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].count, 42);
        assert_eq!(buckets[0].start, buckets[0].end);
    }

    #[test]
    fn rejects_inverted_range() {
        let err =
            monthly_distribution(10, Some(date(2024, 3, 1)), Some(date(2024, 2, 1))).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRange { .. }));
    }

    #[test]
    fn splits_evenly_across_two_months() {
        let buckets =
            monthly_distribution(20, Some(date(2024, 1, 1)), Some(date(2024, 2, 29))).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].count, 10);
        assert_eq!(buckets[1].count, 10);
        assert_eq!(buckets[0].start, date(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(buckets[0].end, date(2024, 1, 31).and_hms_opt(23, 59, 59).unwrap());
        assert_eq!(buckets[1].end, date(2024, 2, 29).and_hms_opt(23, 59, 59).unwrap());
    }

    #[test]
    fn remainder_goes_to_earliest_months() {
        let buckets =
            monthly_distribution(10, Some(date(2024, 1, 15)), Some(date(2024, 3, 10))).unwrap();
        assert_eq!(buckets.len(), 3);
        assert_eq!(
            buckets.iter().map(|b| b.count).collect::<Vec<_>>(),
            vec![4, 3, 3]
        );
        // First and last windows clipped to the requested days.
        assert_eq!(buckets[0].start.date(), date(2024, 1, 15));
        assert_eq!(buckets[2].end.date(), date(2024, 3, 10));
        // Middle month covers the whole of February.
        assert_eq!(buckets[1].start.date(), date(2024, 2, 1));
        assert_eq!(buckets[1].end.date(), date(2024, 2, 29));
    }

    #[test]
    fn drops_zero_count_buckets_but_preserves_sum() {
        let buckets =
            monthly_distribution(2, Some(date(2024, 1, 1)), Some(date(2024, 6, 30))).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<u64>(), 2);
        assert_eq!(buckets[0].start.date(), date(2024, 1, 1));
        assert_eq!(buckets[1].start.date(), date(2024, 2, 1));
    }

    #[test]
    fn single_day_range_is_one_bucket() {
        let buckets =
            monthly_distribution(5, Some(date(2024, 7, 4)), Some(date(2024, 7, 4))).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].count, 5);
        assert_eq!(buckets[0].start, date(2024, 7, 4).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(buckets[0].end, date(2024, 7, 4).and_hms_opt(23, 59, 59).unwrap());
    }

    #[test]
    fn month_helpers_roll_over_december() {
        assert_eq!(month_start(date(2024, 12, 25)), date(2024, 12, 1));
        assert_eq!(next_month_start(date(2024, 12, 25)), date(2025, 1, 1));
        assert_eq!(next_month_start(date(2024, 2, 29)), date(2024, 3, 1));
    }
}
