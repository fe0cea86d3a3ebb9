use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

impl DateRange {
    /// The whole calendar month, or `None` for an out-of-range month.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(DateRange {
            start,
            end: next.pred_opt()?,
        })
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn month_bounds() {
        let jan = DateRange::month(2025, 1).unwrap();
        assert_eq!(jan.start, date(2025, 1, 1));
        assert_eq!(jan.end, date(2025, 1, 31));
    }

    #[test]
    fn month_handles_leap_february() {
        assert_eq!(DateRange::month(2024, 2).unwrap().end, date(2024, 2, 29));
        assert_eq!(DateRange::month(2025, 2).unwrap().end, date(2025, 2, 28));
    }

    #[test]
    fn december_ends_on_31st() {
        let dec = DateRange::month(2025, 12).unwrap();
        assert_eq!(dec.end, date(2025, 12, 31));
        assert_eq!(dec.start, date(2025, 12, 1));
    }

    #[test]
    fn invalid_month_is_none() {
        assert!(DateRange::month(2025, 0).is_none());
        assert!(DateRange::month(2025, 13).is_none());
    }

    #[test]
    fn contains_is_inclusive() {
        let range = DateRange {
            start: date(2024, 1, 1),
            end: date(2024, 12, 31),
        };
        assert!(range.contains(date(2024, 6, 15)));
        assert!(range.contains(date(2024, 1, 1)));
        assert!(range.contains(date(2024, 12, 31)));
        assert!(!range.contains(date(2023, 12, 31)));
        assert!(!range.contains(date(2025, 1, 1)));
    }

    #[test]
    fn display() {
        let range = DateRange::month(2024, 3).unwrap();
        assert_eq!(range.to_string(), "2024-03-01 to 2024-03-31");
    }
}
