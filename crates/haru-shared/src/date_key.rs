//! Calendar-day keys used to bucket posts.
//!
//! Every key is computed in one fixed timezone, the bucket timezone. The same
//! timezone decides whether a post counts as "today", so a post is always
//! reported as today exactly when it sits in today's bucket.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_BUCKET_UTC_OFFSET_SECS;

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// A `YYYY-MM-DD` string. Lexicographic order equals chronological order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct DateKey(String);

impl DateKey {
    /// Parse a wire key, rejecting anything that is not a real calendar day.
    pub fn parse(s: &str) -> Option<Self> {
        NaiveDate::parse_from_str(s, DATE_KEY_FORMAT)
            .ok()
            .map(Self::from_naive)
    }

    pub fn from_naive(date: NaiveDate) -> Self {
        Self(date.format(DATE_KEY_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps instants to date keys in the bucket timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketCalendar {
    offset: FixedOffset,
}

impl BucketCalendar {
    /// Build a calendar for a UTC offset in seconds. Out-of-range offsets
    /// (beyond +/-24h) fall back to the default bucket timezone.
    pub fn from_offset_secs(secs: i32) -> Self {
        let offset = FixedOffset::east_opt(secs).unwrap_or_else(default_offset);
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn date_key(&self, at: DateTime<Utc>) -> DateKey {
        DateKey::from_naive(at.with_timezone(&self.offset).date_naive())
    }

    pub fn is_same_day(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        self.date_key(a) == self.date_key(b)
    }
}

impl Default for BucketCalendar {
    fn default() -> Self {
        Self {
            offset: default_offset(),
        }
    }
}

fn default_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_BUCKET_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn key_uses_bucket_timezone_not_utc() {
        let cal = BucketCalendar::default();
        // 2025-06-17 16:30 UTC is already 2025-06-18 01:30 in Seoul.
        let at = Utc.with_ymd_and_hms(2025, 6, 17, 16, 30, 0).unwrap();
        assert_eq!(cal.date_key(at).as_str(), "2025-06-18");

        let utc = BucketCalendar::from_offset_secs(0);
        assert_eq!(utc.date_key(at).as_str(), "2025-06-17");
    }

    #[test]
    fn parse_rejects_non_dates() {
        assert!(DateKey::parse("2025-06-17").is_some());
        assert!(DateKey::parse("2025-02-30").is_none());
        assert!(DateKey::parse("2025.06.17").is_none());
        assert!(DateKey::parse("").is_none());
    }

    #[test]
    fn keys_order_chronologically() {
        let a = DateKey::parse("2024-12-31").unwrap();
        let b = DateKey::parse("2025-01-01").unwrap();
        assert!(a < b);
    }

    #[test]
    fn same_day_follows_bucket_boundaries() {
        let cal = BucketCalendar::default();
        let late = Utc.with_ymd_and_hms(2025, 6, 17, 14, 59, 0).unwrap(); // 23:59 KST
        let early = Utc.with_ymd_and_hms(2025, 6, 17, 15, 0, 0).unwrap(); // 00:00 KST next day
        assert!(!cal.is_same_day(late, early));
        assert!(cal.is_same_day(early, early + chrono::Duration::hours(8)));
    }

    #[test]
    fn invalid_offset_falls_back_to_default() {
        let cal = BucketCalendar::from_offset_secs(200_000);
        assert_eq!(cal, BucketCalendar::default());
    }
}
