//! Nearest-date matching of sensing folders to analysis months.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, info};

use erosivity_common::{end_of_month, month_label, ErosivityError, Result};

use crate::artifact::DatedArtifact;
use crate::dates::DatePrecision;

/// Largest distance between a month's last day and its sensing date.
pub const MONTH_END_TOLERANCE_DAYS: i64 = 15;

/// Largest distance between a user-chosen sensing date and the automatic
/// pick it replaces.
pub const OVERRIDE_TOLERANCE_DAYS: i64 = 30;

/// Candidate closest to `target`, first seen on ties.
///
/// Fails when there are no candidates or the closest one is more than
/// `tolerance_days` away.
pub fn nearest_date_match<'a>(
    candidates: &'a [DatedArtifact],
    target: NaiveDateTime,
    tolerance_days: i64,
) -> Result<&'a DatedArtifact> {
    let (best, distance) = candidates
        .iter()
        .map(|c| (c, (c.date() - target).abs()))
        .fold(None::<(&DatedArtifact, Duration)>, |best, (c, d)| match best {
            Some((_, best_d)) if best_d <= d => best,
            _ => Some((c, d)),
        })
        .ok_or_else(|| {
            ErosivityError::series_incomplete(
                "sensing dates",
                format!("no candidates to match {}", target.format("%Y-%m-%d")),
            )
        })?;

    if distance > Duration::days(tolerance_days) {
        return Err(ErosivityError::series_incomplete(
            "sensing dates",
            format!(
                "nearest to {} is {}, {} days away (limit {})",
                target.format("%Y-%m-%d"),
                best,
                distance.num_days(),
                tolerance_days
            ),
        ));
    }
    Ok(best)
}

fn last_day(month: NaiveDate) -> NaiveDateTime {
    end_of_month(month).date().and_time(NaiveTime::MIN)
}

/// For every month, the day-dated candidate nearest to its last day.
pub fn month_end_matches(
    candidates: &[DatedArtifact],
    months: &[NaiveDate],
) -> Result<Vec<DatedArtifact>> {
    let days: Vec<DatedArtifact> = candidates
        .iter()
        .filter(|c| c.precision() == DatePrecision::Day)
        .cloned()
        .collect();

    months
        .iter()
        .map(|month| {
            let target = last_day(*month);
            let pick = nearest_date_match(&days, target, MONTH_END_TOLERANCE_DAYS).map_err(|_| {
                ErosivityError::series_incomplete(
                    "sensing dates",
                    format!(
                        "no sensing date within {} days of the end of {}",
                        MONTH_END_TOLERANCE_DAYS,
                        month_label(*month)
                    ),
                )
            })?;
            debug!(month = %month_label(*month), sensing = %pick, "Matched sensing date");
            Ok(pick.clone())
        })
        .collect()
}

/// Automatic month-end picks with user-chosen sensing dates substituted.
///
/// Every override must name an existing candidate. It replaces the automatic
/// pick nearest to it when that pick is less than
/// [`OVERRIDE_TOLERANCE_DAYS`] away; otherwise it is ignored.
pub fn apply_overrides(
    candidates: &[DatedArtifact],
    months: &[NaiveDate],
    overrides: &[NaiveDate],
) -> Result<Vec<DatedArtifact>> {
    let mut picks = month_end_matches(candidates, months)?;

    for date in overrides {
        let chosen = candidates
            .iter()
            .find(|c| c.date().date() == *date)
            .ok_or_else(|| {
                ErosivityError::configuration(format!(
                    "no sensing folder for requested date {}",
                    date.format("%Y%m%d")
                ))
            })?;

        let slot = picks
            .iter()
            .enumerate()
            .map(|(i, p)| (i, (p.date() - chosen.date()).abs()))
            .fold(None::<(usize, Duration)>, |best, (i, d)| match best {
                Some((_, best_d)) if best_d <= d => best,
                _ => Some((i, d)),
            });

        match slot {
            Some((i, d)) if d < Duration::days(OVERRIDE_TOLERANCE_DAYS) => {
                info!(
                    replaced = %picks[i],
                    chosen = %chosen,
                    "Using requested sensing date"
                );
                picks[i] = chosen.clone();
            }
            _ => debug!(chosen = %chosen, "Requested sensing date matches no analysis month"),
        }
    }

    Ok(picks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn folder(name: &str) -> DatedArtifact {
        DatedArtifact::new(PathBuf::from(name), name).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_nearest_match_first_seen_on_tie() {
        let c = vec![folder("20180420"), folder("20180422"), folder("20180425")];
        let target = date(2018, 4, 21).and_time(NaiveTime::MIN);
        assert_eq!(nearest_date_match(&c, target, 15).unwrap().name(), "20180420");
    }

    #[test]
    fn test_nearest_match_tolerance_and_empty() {
        let c = vec![folder("20180401")];
        let target = date(2018, 4, 30).and_time(NaiveTime::MIN);
        assert!(nearest_date_match(&c, target, 15).is_err());
        assert!(nearest_date_match(&c, target, 30).is_ok());
        assert!(nearest_date_match(&[], target, 30).is_err());
    }

    #[test]
    fn test_month_end_matches() {
        let c = vec![
            folder("20180405"),
            folder("20180428"),
            folder("20180503"),
            folder("20180527"),
        ];
        let picks = month_end_matches(&c, &[date(2018, 4, 1), date(2018, 5, 1)]).unwrap();
        let names: Vec<&str> = picks.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["20180428", "20180527"]);
    }

    #[test]
    fn test_month_end_without_candidate_fails() {
        let c = vec![folder("20180405")];
        assert!(month_end_matches(&c, &[date(2018, 4, 1)]).is_err());
    }

    #[test]
    fn test_overrides_replace_automatic_pick() {
        let c = vec![
            folder("20180420"),
            folder("20180428"),
            folder("20180527"),
        ];
        let months = [date(2018, 4, 1), date(2018, 5, 1)];
        let picks = apply_overrides(&c, &months, &[date(2018, 4, 20)]).unwrap();
        let names: Vec<&str> = picks.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["20180420", "20180527"]);
    }

    #[test]
    fn test_override_must_exist() {
        let c = vec![folder("20180428")];
        let err = apply_overrides(&c, &[date(2018, 4, 1)], &[date(2018, 4, 15)]).unwrap_err();
        assert!(matches!(err, ErosivityError::Configuration(_)));
    }
}
