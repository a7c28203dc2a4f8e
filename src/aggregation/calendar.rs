//! Calendar Buckets
//!
//! Granularities for date histograms: alignment, stepping and the maximum
//! span each one may cover. All arithmetic is in UTC.

use crate::query::{QueryError, QueryResult};
use chrono::{DateTime, Datelike, Duration, Months, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Calendar unit of a date histogram bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Second,
    Minute,
    Hour,
    Day,
    /// Starts on Monday
    Week,
    Month,
    Year,
}

impl Granularity {
    /// Finest first
    pub const ALL: [Granularity; 7] = [
        Self::Second,
        Self::Minute,
        Self::Hour,
        Self::Day,
        Self::Week,
        Self::Month,
        Self::Year,
    ];

    /// Parse a granularity name or one of its aliases
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "second" => Some(Self::Second),
            "minute" => Some(Self::Minute),
            "hour" | "hourly" => Some(Self::Hour),
            "day" | "daily" => Some(Self::Day),
            "week" | "weekly" => Some(Self::Week),
            "month" | "monthly" => Some(Self::Month),
            "year" | "yearly" => Some(Self::Year),
            _ => None,
        }
    }

    /// Largest number of units a request window may span
    pub fn max_span(&self) -> u32 {
        match self {
            Self::Second => 300,
            Self::Minute => 1440,
            Self::Hour => 672,
            Self::Day => 1095,
            Self::Week => 1060,
            Self::Month => 1200,
            Self::Year => 1000,
        }
    }

    /// Truncate a timestamp to the start of its bucket
    pub fn truncate(&self, dt: DateTime<Utc>) -> DateTime<Utc> {
        let second = dt.with_nanosecond(0).unwrap_or(dt);
        let minute = second.with_second(0).unwrap_or(second);
        let hour = minute.with_minute(0).unwrap_or(minute);
        let day = hour.with_hour(0).unwrap_or(hour);

        match self {
            Self::Second => second,
            Self::Minute => minute,
            Self::Hour => hour,
            Self::Day => day,
            Self::Week => {
                let days_since_monday = day.weekday().num_days_from_monday() as i64;
                day - Duration::days(days_since_monday)
            }
            Self::Month => day.with_day(1).unwrap_or(day),
            Self::Year => day
                .with_day(1)
                .and_then(|d| d.with_month(1))
                .unwrap_or(day),
        }
    }

    /// Step `n` units forward; `None` past the end of the calendar
    pub fn advance(&self, dt: DateTime<Utc>, n: u32) -> Option<DateTime<Utc>> {
        let n64 = i64::from(n);
        match self {
            Self::Second => dt.checked_add_signed(Duration::seconds(n64)),
            Self::Minute => dt.checked_add_signed(Duration::minutes(n64)),
            Self::Hour => dt.checked_add_signed(Duration::hours(n64)),
            Self::Day => dt.checked_add_signed(Duration::days(n64)),
            Self::Week => dt.checked_add_signed(Duration::weeks(n64)),
            Self::Month => dt.checked_add_months(Months::new(n)),
            Self::Year => dt.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }

    /// Whether `[from, to]` fits within this granularity's span cap
    pub fn admits(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        match self.advance(from, self.max_span()) {
            Some(limit) => to <= limit,
            None => true,
        }
    }

    /// Fail with `RangeExceeded` unless the window fits
    pub fn check_span(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> QueryResult<()> {
        if self.admits(from, to) {
            Ok(())
        } else {
            Err(QueryError::RangeExceeded {
                granularity: self.to_string(),
                limit: format!("at most {} {}s between from and to", self.max_span(), self),
            })
        }
    }

    /// The finest granularity whose cap admits the window
    pub fn auto(from: DateTime<Utc>, to: DateTime<Utc>) -> QueryResult<Self> {
        match Self::ALL.into_iter().find(|g| g.admits(from, to)) {
            Some(granularity) => Ok(granularity),
            None => Self::Year.check_span(from, to).map(|_| Self::Year),
        }
    }

    /// Every aligned bucket start from `truncate(from)` to `truncate(to)`
    pub fn bucket_starts(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let end = self.truncate(to);
        let mut current = self.truncate(from);
        let mut starts = Vec::new();

        while current <= end {
            starts.push(current);
            match self.advance(current, 1) {
                Some(next) => current = next,
                None => break,
            }
        }
        starts
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Second => write!(f, "second"),
            Self::Minute => write!(f, "minute"),
            Self::Hour => write!(f, "hour"),
            Self::Day => write!(f, "day"),
            Self::Week => write!(f, "week"),
            Self::Month => write!(f, "month"),
            Self::Year => write!(f, "year"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{format_timestamp, parse_timestamp};

    fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    fn fmt(dt: DateTime<Utc>) -> String {
        format_timestamp(dt)
    }

    #[test]
    fn test_truncate() {
        let dt = ts("2024-01-17T14:35:42.123Z");

        assert_eq!(fmt(Granularity::Second.truncate(dt)), "2024-01-17T14:35:42.000Z");
        assert_eq!(fmt(Granularity::Minute.truncate(dt)), "2024-01-17T14:35:00.000Z");
        assert_eq!(fmt(Granularity::Hour.truncate(dt)), "2024-01-17T14:00:00.000Z");
        assert_eq!(fmt(Granularity::Day.truncate(dt)), "2024-01-17T00:00:00.000Z");
        // 2024-01-17 is a Wednesday
        assert_eq!(fmt(Granularity::Week.truncate(dt)), "2024-01-15T00:00:00.000Z");
        assert_eq!(fmt(Granularity::Month.truncate(dt)), "2024-01-01T00:00:00.000Z");
        assert_eq!(fmt(Granularity::Year.truncate(dt)), "2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_week_truncate_crosses_month() {
        // Sunday
        let dt = ts("2024-03-03T10:00:00Z");
        assert_eq!(fmt(Granularity::Week.truncate(dt)), "2024-02-26T00:00:00.000Z");
    }

    #[test]
    fn test_advance_months_from_aligned_start() {
        let jan = ts("2024-01-01T00:00:00Z");
        assert_eq!(
            fmt(Granularity::Month.advance(jan, 1).unwrap()),
            "2024-02-01T00:00:00.000Z"
        );
        assert_eq!(
            fmt(Granularity::Year.advance(jan, 2).unwrap()),
            "2026-01-01T00:00:00.000Z"
        );
    }

    #[test]
    fn test_second_cap() {
        let from = ts("2020-01-01T00:00:00Z");
        assert!(Granularity::Second
            .check_span(from, ts("2020-01-01T00:05:00Z"))
            .is_ok());

        let err = Granularity::Second
            .check_span(from, ts("2020-01-01T00:05:01Z"))
            .unwrap_err();
        match err {
            QueryError::RangeExceeded { granularity, .. } => assert_eq!(granularity, "second"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_auto_picks_finest_admitting() {
        let from = ts("2020-01-01T00:00:00Z");
        assert_eq!(
            Granularity::auto(from, ts("2020-01-01T00:04:00Z")).unwrap(),
            Granularity::Second
        );
        assert_eq!(
            Granularity::auto(from, ts("2020-01-01T12:00:00Z")).unwrap(),
            Granularity::Minute
        );
        assert_eq!(
            Granularity::auto(from, ts("2020-01-20T00:00:00Z")).unwrap(),
            Granularity::Hour
        );
        assert_eq!(
            Granularity::auto(from, ts("2021-06-01T00:00:00Z")).unwrap(),
            Granularity::Day
        );
    }

    #[test]
    fn test_bucket_starts_inclusive() {
        let starts = Granularity::Day.bucket_starts(
            ts("2020-01-01T12:00:00Z"),
            ts("2020-01-03T00:00:00Z"),
        );
        let keys: Vec<String> = starts.into_iter().map(fmt).collect();
        assert_eq!(
            keys,
            vec![
                "2020-01-01T00:00:00.000Z",
                "2020-01-02T00:00:00.000Z",
                "2020-01-03T00:00:00.000Z"
            ]
        );
    }

    #[test]
    fn test_aliases() {
        assert_eq!(Granularity::from_name("daily"), Some(Granularity::Day));
        assert_eq!(Granularity::from_name("hourly"), Some(Granularity::Hour));
        assert_eq!(Granularity::from_name("fortnight"), None);
    }
}
