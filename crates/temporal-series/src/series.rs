//! Window filtering, cardinality validation and pairwise date checks.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use erosivity_common::{days_in_month, month_label, AnalysisWindow, ErosivityError, Granularity, Result};

use crate::artifact::DatedArtifact;

/// A series that passed validation, in stored (name) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedSeries {
    name: String,
    granularity: Granularity,
    artifacts: Vec<DatedArtifact>,
}

impl AlignedSeries {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn artifacts(&self) -> &[DatedArtifact] {
        &self.artifacts
    }

    pub fn into_artifacts(self) -> Vec<DatedArtifact> {
        self.artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Artifacts dated in the month starting at `month`.
    pub fn for_month(&self, month: NaiveDate) -> Vec<&DatedArtifact> {
        self.artifacts
            .iter()
            .filter(|a| a.same_month(month.year(), month.month()))
            .collect()
    }
}

/// Keep the artifacts dated inside `window` (both ends inclusive).
pub fn filter_to_window(artifacts: &[DatedArtifact], window: &AnalysisWindow) -> Vec<DatedArtifact> {
    let kept: Vec<DatedArtifact> = artifacts
        .iter()
        .filter(|a| window.contains(&a.date()))
        .cloned()
        .collect();

    debug!(
        window = %window,
        total = artifacts.len(),
        kept = kept.len(),
        "Filtered series to analysis window"
    );
    kept
}

/// Periods missing from or repeated in `artifacts` for `granularity`.
fn period_gaps(
    artifacts: &[DatedArtifact],
    expected: &[NaiveDateTime],
    granularity: Granularity,
) -> (Vec<String>, Vec<String>) {
    let mut seen: BTreeMap<NaiveDateTime, usize> = expected.iter().map(|p| (*p, 0)).collect();
    let mut unexpected = Vec::new();
    for a in artifacts {
        match seen.get_mut(&granularity.period_of(a.date())) {
            Some(count) => *count += 1,
            None => unexpected.push(a.name().to_string()),
        }
    }

    let missing = seen
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(p, _)| granularity.format_period(*p))
        .collect();
    let mut repeated: Vec<String> = seen
        .iter()
        .filter(|(_, n)| **n > 1)
        .map(|(p, _)| granularity.format_period(*p))
        .collect();
    repeated.extend(unexpected);
    (missing, repeated)
}

fn summarize(items: &[String]) -> String {
    const SHOWN: usize = 10;
    if items.len() <= SHOWN {
        items.join(", ")
    } else {
        format!("{}, ... ({} total)", items[..SHOWN].join(", "), items.len())
    }
}

/// Check that `artifacts` form a complete series over `window`.
///
/// The series must hold one file per month, per day or per hour of the
/// window, and each of those periods exactly once. The granularity is taken
/// from the file count when it matches one of the admissible counts, and
/// from the date precision of the names otherwise.
pub fn validate_cardinality(
    name: &str,
    artifacts: &[DatedArtifact],
    window: &AnalysisWindow,
) -> Result<AlignedSeries> {
    let first = artifacts.first().ok_or_else(|| {
        ErosivityError::series_incomplete(name, format!("no files inside {}", window))
    })?;

    let admissible = [Granularity::Monthly, Granularity::Daily, Granularity::Hourly];
    let granularity = admissible
        .into_iter()
        .find(|g| window.expected_count(*g) == artifacts.len())
        .unwrap_or_else(|| first.precision().granularity());

    let expected = window.periods(granularity);
    let (missing, repeated) = period_gaps(artifacts, &expected, granularity);

    if !missing.is_empty() || !repeated.is_empty() || artifacts.len() != expected.len() {
        let mut detail = format!(
            "found {} {} files in {}, expected {}",
            artifacts.len(),
            granularity,
            window,
            expected.len()
        );
        if !missing.is_empty() {
            detail.push_str(&format!("; missing {}", summarize(&missing)));
        }
        if !repeated.is_empty() {
            detail.push_str(&format!("; duplicated {}", summarize(&repeated)));
        }
        return Err(ErosivityError::series_incomplete(name, detail));
    }

    info!(
        series = %name,
        granularity = %granularity,
        count = artifacts.len(),
        window = %window,
        "Series validated"
    );
    Ok(AlignedSeries {
        name: name.to_string(),
        granularity,
        artifacts: artifacts.to_vec(),
    })
}

/// Select the precipitation or temperature files of one month.
///
/// A month may be stored daily, 3-hourly or hourly, so the admissible counts
/// are `days`, `days * 8` and `days * 24`.
pub fn files_for_month(
    name: &str,
    artifacts: &[DatedArtifact],
    month: NaiveDate,
) -> Result<AlignedSeries> {
    let selected: Vec<DatedArtifact> = artifacts
        .iter()
        .filter(|a| a.same_month(month.year(), month.month()))
        .cloned()
        .collect();

    let label = month_label(month);
    if selected.is_empty() {
        return Err(ErosivityError::series_incomplete(
            name,
            format!("no files for {}", label),
        ));
    }

    let days = days_in_month(month.year(), month.month()) as usize;
    let granularity = match selected.len() {
        n if n == days => Granularity::Daily,
        n if n == days * 8 => Granularity::ThreeHourly,
        n if n == days * 24 => Granularity::Hourly,
        n => {
            return Err(ErosivityError::series_incomplete(
                name,
                format!(
                    "{} holds {} files, expected {}, {} or {}",
                    label,
                    n,
                    days,
                    days * 8,
                    days * 24
                ),
            ))
        }
    };

    debug!(
        series = %name,
        month = %label,
        granularity = %granularity,
        count = selected.len(),
        "Selected files for month"
    );
    Ok(AlignedSeries {
        name: name.to_string(),
        granularity,
        artifacts: selected,
    })
}

/// Check that two series hold the same dates in the same order.
///
/// The first differing index is reported in the error.
pub fn compare_dates(
    name_a: &str,
    a: &[DatedArtifact],
    name_b: &str,
    b: &[DatedArtifact],
) -> Result<()> {
    if a.is_empty() || b.is_empty() {
        return Err(ErosivityError::series_mismatch(format!(
            "{} and/or {} has no files",
            name_a, name_b
        )));
    }
    if a.len() != b.len() {
        return Err(ErosivityError::series_mismatch(format!(
            "{} has {} files but {} has {}",
            name_a,
            a.len(),
            name_b,
            b.len()
        )));
    }

    if let Some((index, (x, y))) = a
        .iter()
        .zip(b)
        .enumerate()
        .find(|(_, (x, y))| x.date() != y.date())
    {
        return Err(ErosivityError::series_mismatch_at(
            index,
            format!("{} has {} but {} has {}", name_a, x, name_b, y),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn artifact(name: &str) -> DatedArtifact {
        DatedArtifact::new(PathBuf::from(name), name).unwrap()
    }

    fn window(start: &str, end: &str) -> AnalysisWindow {
        AnalysisWindow::parse(start, end).unwrap()
    }

    #[test]
    fn test_filter_keeps_end_of_month_timestamps() {
        let items = vec![
            artifact("T_2018033123"),
            artifact("T_2018040100"),
            artifact("T_2018043023"),
            artifact("T_2018050100"),
        ];
        let kept = filter_to_window(&items, &window("201804", "201804"));
        let names: Vec<&str> = kept.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["T_2018040100", "T_2018043023"]);
    }

    #[test]
    fn test_cardinality_daily_series() {
        let items: Vec<_> = (1..=30).map(|d| artifact(&format!("P_201804{:02}", d))).collect();
        let series = validate_cardinality("precipitation", &items, &window("201804", "201804")).unwrap();
        assert_eq!(series.granularity(), Granularity::Daily);
        assert_eq!(series.len(), 30);
    }

    #[test]
    fn test_cardinality_empty_fails() {
        let err = validate_cardinality("rain", &[], &window("201804", "201804")).unwrap_err();
        assert!(matches!(err, ErosivityError::SeriesIncomplete { .. }));
    }

    #[test]
    fn test_right_count_wrong_months_fails() {
        // Two files but one lies outside the window's months.
        let items = vec![artifact("R_201804"), artifact("R_201806")];
        let err = validate_cardinality("rain", &items, &window("201804", "201805")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("missing 2018-05"), "{msg}");
    }

    #[test]
    fn test_files_for_month_admissible_counts() {
        let daily: Vec<_> = (1..=30).map(|d| artifact(&format!("P_201804{:02}", d))).collect();
        let month = NaiveDate::from_ymd_opt(2018, 4, 1).unwrap();
        assert_eq!(
            files_for_month("P", &daily, month).unwrap().granularity(),
            Granularity::Daily
        );

        let three_hourly: Vec<_> = (1..=30)
            .flat_map(|d| (0..8).map(move |h| artifact(&format!("P_201804{:02}{:02}", d, h * 3))))
            .collect();
        assert_eq!(
            files_for_month("P", &three_hourly, month).unwrap().granularity(),
            Granularity::ThreeHourly
        );

        let err = files_for_month("P", &daily[..29], month).unwrap_err();
        assert!(matches!(err, ErosivityError::SeriesIncomplete { .. }));

        let err = files_for_month("P", &daily, NaiveDate::from_ymd_opt(2018, 5, 1).unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("201805"));
    }

    #[test]
    fn test_compare_dates_reports_first_mismatch() {
        let a = vec![artifact("P_20180401"), artifact("P_20180402"), artifact("P_20180403")];
        let b = vec![artifact("T_20180401"), artifact("T_20180403"), artifact("T_20180402")];

        assert!(compare_dates("P", &a, "T", &a.clone()).is_ok());
        match compare_dates("P", &a, "T", &b).unwrap_err() {
            ErosivityError::SeriesMismatch { index, .. } => assert_eq!(index, Some(1)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_compare_dates_length_and_empty() {
        let a = vec![artifact("P_20180401")];
        assert!(compare_dates("P", &a, "T", &[]).is_err());
        let b = vec![artifact("T_20180401"), artifact("T_20180402")];
        match compare_dates("P", &a, "T", &b).unwrap_err() {
            ErosivityError::SeriesMismatch { index, .. } => assert_eq!(index, None),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
