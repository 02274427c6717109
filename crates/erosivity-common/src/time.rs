//! Analysis windows and calendar helpers.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ErosivityError, Result};

/// Number of days in the given month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(31)
}

/// First instant of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .unwrap_or(date)
        .and_time(NaiveTime::MIN)
}

/// Last second of the month containing `date`.
pub fn end_of_month(date: NaiveDate) -> NaiveDateTime {
    let last = days_in_month(date.year(), date.month());
    NaiveDate::from_ymd_opt(date.year(), date.month(), last)
        .unwrap_or(date)
        .and_hms_opt(23, 59, 59)
        .unwrap_or_else(|| date.and_time(NaiveTime::MIN))
}

/// `YYYYMM` label used in output file names.
pub fn month_label(date: NaiveDate) -> String {
    format!("{:04}{:02}", date.year(), date.month())
}

/// Temporal resolution of a raster series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Monthly,
    Daily,
    ThreeHourly,
    Hourly,
}

impl Granularity {
    /// Truncate a timestamp to the start of its period.
    pub fn period_of(&self, dt: NaiveDateTime) -> NaiveDateTime {
        let date = dt.date();
        match self {
            Granularity::Monthly => month_start(date),
            Granularity::Daily => date.and_time(NaiveTime::MIN),
            Granularity::ThreeHourly => {
                let hour = dt.hour();
                date.and_hms_opt(hour - hour % 3, 0, 0)
                    .unwrap_or_else(|| date.and_time(NaiveTime::MIN))
            }
            Granularity::Hourly => {
                date.and_hms_opt(dt.hour(), 0, 0)
                    .unwrap_or_else(|| date.and_time(NaiveTime::MIN))
            }
        }
    }

    /// Human-readable label of a period start.
    pub fn format_period(&self, period: NaiveDateTime) -> String {
        match self {
            Granularity::Monthly => period.format("%Y-%m").to_string(),
            Granularity::Daily => period.format("%Y-%m-%d").to_string(),
            Granularity::ThreeHourly | Granularity::Hourly => {
                period.format("%Y-%m-%d %H:00").to_string()
            }
        }
    }

    fn step(&self) -> Option<Duration> {
        match self {
            Granularity::Monthly => None,
            Granularity::Daily => Some(Duration::days(1)),
            Granularity::ThreeHourly => Some(Duration::hours(3)),
            Granularity::Hourly => Some(Duration::hours(1)),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Granularity::Monthly => "monthly",
            Granularity::Daily => "daily",
            Granularity::ThreeHourly => "3-hourly",
            Granularity::Hourly => "hourly",
        };
        write!(f, "{}", s)
    }
}

/// Inclusive `[start, end]` analysis window.
///
/// The end is always pushed to the last second of its month so whole final
/// months are retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisWindow {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl AnalysisWindow {
    /// Create a window from its first and last dates.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let start = start.and_time(NaiveTime::MIN);
        let end = end_of_month(end);
        if start > end {
            return Err(ErosivityError::configuration(format!(
                "analysis window start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Window covering a single calendar month.
    pub fn month(date: NaiveDate) -> Result<Self> {
        Self::new(month_start(date).date(), date)
    }

    /// Parse window bounds written as `YYYYMM`, `YYYY-MM` or `YYYY-MM-DD`.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_window_date(start)?, parse_window_date(end)?)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn contains(&self, dt: &NaiveDateTime) -> bool {
        dt >= &self.start && dt <= &self.end
    }

    pub fn n_months(&self) -> usize {
        let (s, e) = (self.start.date(), self.end.date());
        ((e.year() - s.year()) * 12 + e.month() as i32 - s.month() as i32 + 1).max(0) as usize
    }

    pub fn n_days(&self) -> usize {
        ((self.end.date() - self.start.date()).num_days() + 1).max(0) as usize
    }

    pub fn n_hours(&self) -> usize {
        self.n_days() * 24
    }

    /// Number of files a complete series of `granularity` holds in this window.
    pub fn expected_count(&self, granularity: Granularity) -> usize {
        match granularity {
            Granularity::Monthly => self.n_months(),
            Granularity::Daily => self.n_days(),
            Granularity::ThreeHourly => self.n_days() * 8,
            Granularity::Hourly => self.n_hours(),
        }
    }

    /// First day of every month in the window, in order.
    pub fn months(&self) -> Vec<NaiveDate> {
        let mut months = Vec::with_capacity(self.n_months());
        let mut current = month_start(self.start.date()).date();
        while current <= self.end.date() {
            months.push(current);
            current = match current.month() {
                12 => NaiveDate::from_ymd_opt(current.year() + 1, 1, 1),
                m => NaiveDate::from_ymd_opt(current.year(), m + 1, 1),
            }
            .unwrap_or(NaiveDate::MAX);
        }
        months
    }

    /// Start of every period of `granularity` in the window.
    pub fn periods(&self, granularity: Granularity) -> Vec<NaiveDateTime> {
        match granularity.step() {
            None => self
                .months()
                .into_iter()
                .map(|m| m.and_time(NaiveTime::MIN))
                .collect(),
            Some(step) => {
                let mut periods = Vec::with_capacity(self.expected_count(granularity));
                let mut current = granularity.period_of(self.start);
                while current <= self.end {
                    periods.push(current);
                    current += step;
                }
                periods
            }
        }
    }
}

impl fmt::Display for AnalysisWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} .. {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

fn parse_window_date(s: &str) -> Result<NaiveDate> {
    let trimmed = s.trim();
    let candidates = [
        (format!("{}-01", trimmed), "%Y-%m-%d"),
        (format!("{}01", trimmed), "%Y%m%d"),
        (trimmed.to_string(), "%Y-%m-%d"),
        (trimmed.to_string(), "%Y%m%d"),
    ];

    candidates
        .iter()
        .find_map(|(text, fmt)| NaiveDate::parse_from_str(text, fmt).ok())
        .ok_or_else(|| {
            ErosivityError::configuration(format!(
                "invalid window date '{}', expected YYYYMM, YYYY-MM or YYYY-MM-DD",
                s
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(year: i32, month: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, 1).unwrap()
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2016, 2), 29);
        assert_eq!(days_in_month(2017, 2), 28);
        assert_eq!(days_in_month(2017, 12), 31);
        assert_eq!(days_in_month(2018, 4), 30);
    }

    #[test]
    fn test_window_end_normalized_to_end_of_month() {
        let window = AnalysisWindow::new(ym(2016, 5), ym(2018, 4)).unwrap();
        assert_eq!(
            window.end(),
            NaiveDate::from_ymd_opt(2018, 4, 30)
                .unwrap()
                .and_hms_opt(23, 59, 59)
                .unwrap()
        );
        assert!(window.contains(
            &NaiveDate::from_ymd_opt(2018, 4, 30)
                .unwrap()
                .and_hms_opt(23, 0, 0)
                .unwrap()
        ));
    }

    #[test]
    fn test_window_counts() {
        let window = AnalysisWindow::new(ym(2016, 5), ym(2018, 4)).unwrap();
        assert_eq!(window.n_months(), 24);
        assert_eq!(window.n_days(), 730);
        assert_eq!(window.n_hours(), 730 * 24);
        assert_eq!(window.months().len(), 24);
        assert_eq!(window.periods(Granularity::Daily).len(), 730);
    }

    #[test]
    fn test_single_month_window() {
        let window = AnalysisWindow::month(NaiveDate::from_ymd_opt(2016, 2, 14).unwrap()).unwrap();
        assert_eq!(window.n_days(), 29);
        assert_eq!(window.expected_count(Granularity::ThreeHourly), 29 * 8);
        assert_eq!(window.periods(Granularity::ThreeHourly).len(), 29 * 8);
    }

    #[test]
    fn test_parse_window_formats() {
        let a = AnalysisWindow::parse("201605", "201804").unwrap();
        let b = AnalysisWindow::parse("2016-05", "2018-04").unwrap();
        assert_eq!(a, b);
        assert!(AnalysisWindow::parse("2018-05", "2016-04").is_err());
        assert!(AnalysisWindow::parse("May 2016", "2018-04").is_err());
    }

    #[test]
    fn test_period_truncation() {
        let dt = NaiveDate::from_ymd_opt(2018, 4, 15)
            .unwrap()
            .and_hms_opt(5, 30, 0)
            .unwrap();
        assert_eq!(
            Granularity::ThreeHourly.period_of(dt),
            NaiveDate::from_ymd_opt(2018, 4, 15).unwrap().and_hms_opt(3, 0, 0).unwrap()
        );
        assert_eq!(Granularity::Monthly.format_period(dt), "2018-04");
        assert_eq!(month_label(dt.date()), "201804");
    }
}
