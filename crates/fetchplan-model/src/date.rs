//! Calendar dates and inclusive date ranges
//!
//! Dates travel in two textual forms: the compact `d-MMM-yy` form used inside
//! slice DSL strings (`1-Jan-26`) and ISO `YYYY-MM-DD`. Parsing accepts both;
//! formatting for DSL strings always produces the compact form.

use crate::error::ModelError;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Parse a date in `d-MMM-yy`, `d-MMM-yyyy` or ISO form
///
/// ISO timestamps (`2026-01-01T09:00:00Z`) are accepted and truncated to
/// their calendar date.
///
/// # Errors
/// Returns `ModelError::InvalidDate` if no form matches.
pub fn parse_date(input: &str) -> Result<NaiveDate, ModelError> {
    let trimmed = input.trim();
    let iso = trimmed.split('T').next().unwrap_or(trimmed);
    if let Ok(date) = NaiveDate::parse_from_str(iso, "%Y-%m-%d") {
        return Ok(date);
    }
    parse_compact(trimmed).ok_or_else(|| ModelError::InvalidDate(input.to_string()))
}

fn parse_compact(input: &str) -> Option<NaiveDate> {
    let mut parts = input.split('-');
    let day: u32 = parts.next()?.parse().ok()?;
    let month_name = parts.next()?;
    let year_part = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let month = MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(month_name))?;
    let year: i32 = match year_part.len() {
        2 => 2000 + year_part.parse::<i32>().ok()?,
        4 => year_part.parse().ok()?,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()? + 1, day)
}

/// Format a date in the compact `d-MMM-yy` form used by slice DSL strings
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    format!(
        "{}-{}-{:02}",
        date.day(),
        MONTHS[date.month0() as usize],
        date.year().rem_euclid(100)
    )
}

/// Inclusive calendar range `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// First day (inclusive)
    pub start: NaiveDate,
    /// Last day (inclusive)
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting inverted bounds
    ///
    /// # Errors
    /// Returns `ModelError::InvertedRange` if `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ModelError> {
        if start > end {
            return Err(ModelError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Single-day range
    #[inline]
    #[must_use]
    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// Number of calendar days in the range
    #[inline]
    #[must_use]
    pub fn day_count(&self) -> u32 {
        u32::try_from((self.end - self.start).num_days() + 1).unwrap_or(0)
    }

    /// Iterate every day in the range, ascending
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        std::iter::successors(Some(self.start), |d| d.succ_opt()).take_while(move |d| *d <= end)
    }

    /// Whether `day` lies inside the range
    #[inline]
    #[must_use]
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Whether `other` lies entirely inside this range
    #[inline]
    #[must_use]
    pub fn contains_range(&self, other: &DateRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Overlap of two ranges, if any
    #[must_use]
    pub fn intersect(&self, other: &DateRange) -> Option<DateRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(DateRange { start, end })
    }

    /// Render as `d-MMM-yy:d-MMM-yy`
    #[must_use]
    pub fn to_dsl_string(&self) -> String {
        format!("{}:{}", format_date(self.start), format_date(self.end))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Subtract `days` calendar days from `date`
#[inline]
#[must_use]
pub fn days_before(date: NaiveDate, days: i64) -> NaiveDate {
    date - Duration::days(days)
}

/// Merge a date set into minimal contiguous ranges
///
/// Two dates share a range when they are at most one calendar day apart.
#[must_use]
pub fn merge_into_ranges(dates: &BTreeSet<NaiveDate>) -> Vec<DateRange> {
    let mut ranges: Vec<DateRange> = Vec::new();
    for &day in dates {
        match ranges.last_mut() {
            Some(last) if (day - last.end).num_days() <= 1 => last.end = day,
            _ => ranges.push(DateRange::single(day)),
        }
    }
    ranges
}

/// Serde adapters for cache files, which store dates as `d-MMM-yy` strings
pub mod serde_date {
    use super::{format_date, parse_date};
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Optional date fields
    pub mod option {
        use super::{format_date, parse_date, Deserialize, Deserializer, NaiveDate, Serializer};

        /// Serialize as compact string
        ///
        /// # Errors
        /// Propagates serializer errors.
        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDate>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(date) => serializer.serialize_str(&format_date(*date)),
                None => serializer.serialize_none(),
            }
        }

        /// Deserialize from compact or ISO string
        ///
        /// # Errors
        /// Fails on unparseable dates.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDate>, D::Error> {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            raw.filter(|s| !s.trim().is_empty())
                .map(|s| parse_date(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }

    /// Date lists (the `dates` array of a slice)
    pub mod list {
        use super::{format_date, parse_date, Deserialize, Deserializer, NaiveDate, Serializer};
        use serde::ser::SerializeSeq;

        /// Serialize as compact strings
        ///
        /// # Errors
        /// Propagates serializer errors.
        pub fn serialize<S: Serializer>(
            value: &[NaiveDate],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(value.len()))?;
            for date in value {
                seq.serialize_element(&format_date(*date))?;
            }
            seq.end()
        }

        /// Deserialize from compact or ISO strings
        ///
        /// # Errors
        /// Fails on the first unparseable date.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<NaiveDate>, D::Error> {
            let raw: Vec<String> = Vec::deserialize(deserializer)?;
            raw.iter()
                .map(|s| parse_date(s).map_err(serde::de::Error::custom))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_compact_and_iso() {
        assert_eq!(parse_date("1-Jan-26").unwrap(), d(2026, 1, 1));
        assert_eq!(parse_date("15-dec-2025").unwrap(), d(2025, 12, 15));
        assert_eq!(parse_date("2026-02-03").unwrap(), d(2026, 2, 3));
        assert_eq!(parse_date("2026-02-03T10:00:00Z").unwrap(), d(2026, 2, 3));
        assert!(parse_date("31-Feb-26").is_err());
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn formats_compact() {
        assert_eq!(format_date(d(2026, 1, 1)), "1-Jan-26");
        assert_eq!(format_date(d(2025, 11, 20)), "20-Nov-25");
        assert_eq!(format_date(d(2009, 3, 4)), "4-Mar-09");
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        assert!(DateRange::new(d(2026, 1, 2), d(2026, 1, 1)).is_err());
    }

    #[test]
    fn range_day_count_and_iteration() {
        let range = DateRange::new(d(2026, 1, 30), d(2026, 2, 2)).unwrap();
        assert_eq!(range.day_count(), 4);
        let days: Vec<_> = range.days().collect();
        assert_eq!(days.len(), 4);
        assert_eq!(days[2], d(2026, 2, 1));
    }

    #[test]
    fn intersect_and_containment() {
        let a = DateRange::new(d(2026, 1, 1), d(2026, 1, 10)).unwrap();
        let b = DateRange::new(d(2026, 1, 5), d(2026, 1, 20)).unwrap();
        assert_eq!(
            a.intersect(&b),
            Some(DateRange::new(d(2026, 1, 5), d(2026, 1, 10)).unwrap())
        );
        assert!(!a.contains_range(&b));
        assert!(a.contains_range(&DateRange::single(d(2026, 1, 3))));
        let c = DateRange::single(d(2026, 2, 1));
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn merge_groups_adjacent_days() {
        let dates: BTreeSet<_> = [d(2026, 1, 1), d(2026, 1, 2), d(2026, 1, 4), d(2026, 1, 5)]
            .into_iter()
            .collect();
        let ranges = merge_into_ranges(&dates);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].day_count(), 2);
        assert_eq!(ranges[1].start, d(2026, 1, 4));
    }
}
