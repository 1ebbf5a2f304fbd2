//! Date handling helpers.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{ExposureError, ExposureResult};

/// Parse a `YYYY-MM-DD` date.
pub fn parse_iso_date(s: &str) -> ExposureResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| ExposureError::InvalidDate {
        input: s.to_string(),
        message: e.to_string(),
    })
}

/// A trailing window of whole days ending on (and including) `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub end: NaiveDate,
    pub days: u32,
}

impl DateWindow {
    pub fn new(end: NaiveDate, days: u32) -> Self {
        Self { end, days }
    }

    /// First date inside the window.
    pub fn start(&self) -> NaiveDate {
        self.end - Duration::days(i64::from(self.days.saturating_sub(1)))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_parse_iso_date() {
        let date = parse_iso_date("2024-01-15").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 1, 15));
        assert!(parse_iso_date("2024-13-01").is_err());
        assert!(parse_iso_date("20240115").is_err());
    }

    #[test]
    fn test_window_is_inclusive() {
        let end = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let window = DateWindow::new(end, 7);
        assert_eq!(window.start(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert!(window.contains(window.start()));
        assert!(window.contains(end));
        assert!(!window.contains(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
    }
}
