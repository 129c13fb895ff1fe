//! Contiguity checks for daily weather series.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use thiserror::Error;

use croplan_db::models::DailyWeather;

/// Why a series cannot be trusted for a date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CoverageGap {
    #[error("no record for {0}")]
    Missing(NaiveDate),
    #[error("more than one record for {0}")]
    Duplicate(NaiveDate),
}

/// Check that `data` holds exactly one record for every day in
/// `[start, end]`. Records outside the range are ignored. Reports the
/// earliest problem.
pub fn check(data: &[DailyWeather], start: NaiveDate, end: NaiveDate) -> Result<(), CoverageGap> {
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for record in data {
        if (start..=end).contains(&record.date) {
            *counts.entry(record.date).or_default() += 1;
        }
    }

    for day in start.iter_days().take_while(|d| *d <= end) {
        match counts.get(&day) {
            None => return Err(CoverageGap::Missing(day)),
            Some(n) if *n > 1 => return Err(CoverageGap::Duplicate(day)),
            Some(_) => {}
        }
    }
    Ok(())
}

/// The records of `data` dated within `[start, end]`, sorted by date.
pub fn slice(data: &[DailyWeather], start: NaiveDate, end: NaiveDate) -> Vec<DailyWeather> {
    let mut out: Vec<DailyWeather> = data
        .iter()
        .filter(|r| (start..=end).contains(&r.date))
        .cloned()
        .collect();
    out.sort_by_key(|r| r.date);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn series(start: NaiveDate, end: NaiveDate) -> Vec<DailyWeather> {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(|date| DailyWeather {
                date,
                metrics: serde_json::Map::new(),
            })
            .collect()
    }

    #[test]
    fn contiguous_series_passes() {
        let data = series(day(2024, 1, 1), day(2024, 12, 31));
        assert_eq!(data.len(), 366);
        assert!(check(&data, day(2024, 1, 1), day(2024, 12, 31)).is_ok());
        assert!(check(&data, day(2024, 2, 28), day(2024, 3, 1)).is_ok());
    }

    #[test]
    fn gap_is_reported_at_its_first_day() {
        let mut data = series(day(2024, 1, 1), day(2024, 1, 10));
        data.retain(|r| r.date != day(2024, 1, 4) && r.date != day(2024, 1, 7));
        assert_eq!(
            check(&data, day(2024, 1, 1), day(2024, 1, 10)),
            Err(CoverageGap::Missing(day(2024, 1, 4)))
        );
    }

    #[test]
    fn short_series_is_missing_its_tail() {
        let data = series(day(2024, 1, 1), day(2024, 12, 31));
        assert_eq!(
            check(&data, day(2024, 1, 1), day(2025, 1, 1)),
            Err(CoverageGap::Missing(day(2025, 1, 1)))
        );
    }

    #[test]
    fn duplicate_inside_range_fails_outside_is_ignored() {
        let mut data = series(day(2024, 1, 1), day(2024, 1, 5));
        data.push(data[0].clone());
        assert_eq!(
            check(&data, day(2024, 1, 1), day(2024, 1, 5)),
            Err(CoverageGap::Duplicate(day(2024, 1, 1)))
        );
        assert!(check(&data, day(2024, 1, 2), day(2024, 1, 5)).is_ok());
    }

    #[test]
    fn slice_sorts_and_trims() {
        let mut data = series(day(2024, 1, 1), day(2024, 1, 10));
        data.reverse();
        let out = slice(&data, day(2024, 1, 3), day(2024, 1, 5));
        let dates: Vec<_> = out.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(2024, 1, 3), day(2024, 1, 4), day(2024, 1, 5)]);
    }
}
