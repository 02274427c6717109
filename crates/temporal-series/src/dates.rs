//! Dates embedded in file and folder names.
//!
//! All digit runs of a name are concatenated and the length of the result
//! selects the format:
//!
//! | digits | format          | example                  |
//! |--------|-----------------|--------------------------|
//! | 4      | `YYMM` / `MMYY` | `Rain_18_04.tif`         |
//! | 6      | `YYYYMM` / `MMYYYY` | `P_201804.txt`       |
//! | 8      | `YYYYMMDD`      | `20180415`               |
//! | 10     | `YYYYMMDDHH`    | `T_2018041503.txt`       |
//! | 11     | `YYYYMMDD0HH`   | `wasim_20180415003.txt`  |

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use erosivity_common::{ErosivityError, Granularity, Result};

/// Resolution of a date taken from a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePrecision {
    Month,
    Day,
    Hour,
}

impl DatePrecision {
    /// Series granularity implied by this precision.
    pub fn granularity(&self) -> Granularity {
        match self {
            DatePrecision::Month => Granularity::Monthly,
            DatePrecision::Day => Granularity::Daily,
            DatePrecision::Hour => Granularity::Hourly,
        }
    }
}

fn number(digits: &str, range: std::ops::Range<usize>) -> Option<u32> {
    digits.get(range)?.parse().ok()
}

fn ymd(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Two-digit years follow the C library pivot: 69-99 are 19xx, 00-68 are 20xx.
fn expand_year(yy: u32) -> i32 {
    if yy >= 69 {
        1900 + yy as i32
    } else {
        2000 + yy as i32
    }
}

fn valid_month(month: u32) -> bool {
    (1..=12).contains(&month)
}

fn parse_short(digits: &str) -> Option<NaiveDate> {
    let (first, second) = (number(digits, 0..2)?, number(digits, 2..4)?);
    if valid_month(second) {
        ymd(expand_year(first), second, 1)
    } else {
        ymd(expand_year(second), first, 1)
    }
}

fn parse_month(digits: &str) -> Option<NaiveDate> {
    let lead = number(digits, 0..2)?;
    if lead > 12 {
        ymd(number(digits, 0..4)? as i32, number(digits, 4..6)?, 1)
    } else {
        ymd(number(digits, 2..6)? as i32, lead, 1)
    }
}

fn parse_day(digits: &str) -> Option<NaiveDate> {
    ymd(
        number(digits, 0..4)? as i32,
        number(digits, 4..6)?,
        number(digits, 6..8)?,
    )
}

fn at_hour(date: NaiveDate, hour: u32) -> Option<NaiveDateTime> {
    NaiveTime::from_hms_opt(hour, 0, 0).map(|t| date.and_time(t))
}

/// Extract the date encoded in `name`.
///
/// Only the digits matter; separators and letters are ignored. Any digit
/// count other than 4, 6, 8, 10 or 11, or digits that do not form a real
/// calendar date, is a [`ErosivityError::DateFormat`].
pub fn extract_date(name: &str) -> Result<(NaiveDateTime, DatePrecision)> {
    let digits: String = name.chars().filter(|c| c.is_ascii_digit()).collect();

    let parsed = match digits.len() {
        4 => parse_short(&digits).map(|d| (d.and_time(NaiveTime::MIN), DatePrecision::Month)),
        6 => parse_month(&digits).map(|d| (d.and_time(NaiveTime::MIN), DatePrecision::Month)),
        8 => parse_day(&digits).map(|d| (d.and_time(NaiveTime::MIN), DatePrecision::Day)),
        10 => parse_day(&digits)
            .zip(number(&digits, 8..10))
            .and_then(|(d, h)| at_hour(d, h))
            .map(|dt| (dt, DatePrecision::Hour)),
        11 => {
            if digits.as_bytes()[8] != b'0' {
                return Err(ErosivityError::date_format(
                    name,
                    "11-digit dates must be YYYYMMDD0HH",
                ));
            }
            parse_day(&digits)
                .zip(number(&digits, 9..11))
                .and_then(|(d, h)| at_hour(d, h))
                .map(|dt| (dt, DatePrecision::Hour))
        }
        n => {
            return Err(ErosivityError::date_format(
                name,
                format!(
                    "found {} digits, expected YYMM, YYYYMM, MMYYYY, YYYYMMDD, YYYYMMDDHH or YYYYMMDD0HH",
                    n
                ),
            ))
        }
    };

    parsed.ok_or_else(|| {
        ErosivityError::date_format(name, format!("'{}' is not a valid calendar date", digits))
    })
}
