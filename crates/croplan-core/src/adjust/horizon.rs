//! Weather horizon for a candidate allocation set.

use chrono::{Datelike, NaiveDate};

use croplan_db::models::Allocation;

/// Earliest date weather is needed for: the plan start, or an earlier
/// candidate start.
pub fn effective_start_date(planning_start_date: NaiveDate, candidates: &[Allocation]) -> NaiveDate {
    candidates
        .iter()
        .map(|a| a.start_date)
        .min()
        .map_or(planning_start_date, |earliest| earliest.min(planning_start_date))
}

/// Furthest date weather and optimization must be valid for.
///
/// Within the declared horizon this is `planning_end_date`. When a candidate
/// completes after it, the horizon extends to December 31 of the furthest
/// completion year plus `lookahead_years`.
pub fn target_end_date(
    planning_end_date: NaiveDate,
    candidates: &[Allocation],
    lookahead_years: u32,
) -> NaiveDate {
    let Some(furthest) = candidates.iter().map(|a| a.completion_date).max() else {
        return planning_end_date;
    };
    if furthest <= planning_end_date {
        return planning_end_date;
    }

    let year = i32::try_from(lookahead_years)
        .ok()
        .and_then(|n| furthest.year().checked_add(n))
        .unwrap_or(furthest.year());
    NaiveDate::from_ymd_opt(year, 12, 31)
        .unwrap_or(NaiveDate::MAX)
        .max(furthest)
}
