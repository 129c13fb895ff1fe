use std::collections::HashSet;

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use croplan_db::queries::allocations::AllocationValues;

use super::{Proposal, ProposedAllocation};

/// Input rejected before any storage mutation. Every variant names the
/// offending allocation (or field) so a corrected proposal can be produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("duplicate allocation_id {0} in proposal")]
    DuplicateAllocationId(Uuid),

    #[error("{entry}: malformed {field} {value:?} (expected YYYY-MM-DD)")]
    MalformedDate {
        entry: String,
        field: &'static str,
        value: String,
    },

    #[error("{entry}: start_date {start} is after completion_date {completion}")]
    InvertedDates {
        entry: String,
        start: NaiveDate,
        completion: NaiveDate,
    },

    #[error("{entry}: {field} must be a finite, non-negative number (got {value})")]
    InvalidQuantity {
        entry: String,
        field: &'static str,
        value: f64,
    },

    #[error("allocation {allocation_id} belongs to plan {owner_plan_id}, not this plan")]
    CrossPlanReference {
        allocation_id: Uuid,
        owner_plan_id: Uuid,
    },

    #[error("allocation {0} does not exist")]
    UnknownAllocation(Uuid),

    #[error("{entry}: field {field_id} does not belong to this plan")]
    UnresolvedField { entry: String, field_id: Uuid },

    #[error("{entry}: crop {crop_id} does not belong to this plan")]
    UnresolvedCrop { entry: String, crop_id: Uuid },

    #[error("move of allocation {allocation_id}: {reason}")]
    InvalidMove { allocation_id: Uuid, reason: String },
}

/// A validated proposal entry, flattened out of its field group.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredAllocation {
    pub allocation_id: Option<Uuid>,
    pub field_id: Uuid,
    pub crop_id: Uuid,
    pub area: f64,
    pub start_date: NaiveDate,
    pub completion_date: NaiveDate,
    pub cost: f64,
    pub revenue: f64,
    pub profit: f64,
    pub accumulated_gdd: f64,
    /// Human-readable label used in error messages and logs.
    pub label: String,
}

impl DesiredAllocation {
    /// Inclusive day count of the cultivation period.
    pub fn cultivation_days(&self) -> i32 {
        cultivation_days(self.start_date, self.completion_date)
    }

    /// Column values to write for this entry.
    pub fn values(&self) -> AllocationValues {
        AllocationValues {
            field_id: self.field_id,
            crop_id: self.crop_id,
            area: self.area,
            start_date: self.start_date,
            completion_date: self.completion_date,
            cultivation_days: self.cultivation_days(),
            cost: self.cost,
            revenue: self.revenue,
            profit: self.profit,
            accumulated_gdd: self.accumulated_gdd,
        }
    }
}

/// Inclusive number of days from `start` to `completion`.
pub(crate) fn cultivation_days(start: NaiveDate, completion: NaiveDate) -> i32 {
    i32::try_from((completion - start).num_days() + 1).unwrap_or(i32::MAX)
}

pub(super) fn validate_proposal(
    proposal: &Proposal,
) -> Result<Vec<DesiredAllocation>, ValidationError> {
    let mut seen = HashSet::new();
    let mut desired = Vec::with_capacity(proposal.allocation_count());

    for schedule in &proposal.field_schedules {
        for (idx, entry) in schedule.allocations.iter().enumerate() {
            let label = entry_label(entry.allocation_id, schedule.field_id, idx);

            if let Some(id) = entry.allocation_id {
                if !seen.insert(id) {
                    return Err(ValidationError::DuplicateAllocationId(id));
                }
            }

            desired.push(validate_entry(entry, schedule.field_id, label)?);
        }
    }

    Ok(desired)
}

fn validate_entry(
    entry: &ProposedAllocation,
    field_id: Uuid,
    label: String,
) -> Result<DesiredAllocation, ValidationError> {
    let start_date = parse_date(&entry.start_date, "start_date", &label)?;
    let completion_date = parse_date(&entry.completion_date, "completion_date", &label)?;
    if start_date > completion_date {
        return Err(ValidationError::InvertedDates {
            entry: label,
            start: start_date,
            completion: completion_date,
        });
    }

    check_non_negative(entry.area_used, "area_used", &label)?;
    check_non_negative(entry.total_cost, "total_cost", &label)?;
    check_non_negative(entry.expected_revenue, "expected_revenue", &label)?;
    check_non_negative(entry.accumulated_gdd, "accumulated_gdd", &label)?;

    let profit = entry
        .profit
        .unwrap_or(entry.expected_revenue - entry.total_cost);
    if !profit.is_finite() {
        return Err(ValidationError::InvalidQuantity {
            entry: label,
            field: "profit",
            value: profit,
        });
    }

    Ok(DesiredAllocation {
        allocation_id: entry.allocation_id,
        field_id,
        crop_id: entry.crop_id,
        area: entry.area_used,
        start_date,
        completion_date,
        cost: entry.total_cost,
        revenue: entry.expected_revenue,
        profit,
        accumulated_gdd: entry.accumulated_gdd,
        label,
    })
}

fn entry_label(allocation_id: Option<Uuid>, field_id: Uuid, idx: usize) -> String {
    match allocation_id {
        Some(id) => format!("allocation {id}"),
        None => format!("new allocation #{idx} in field {field_id}"),
    }
}

fn parse_date(raw: &str, field: &'static str, label: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| ValidationError::MalformedDate {
        entry: label.to_owned(),
        field,
        value: raw.to_owned(),
    })
}

fn check_non_negative(value: f64, field: &'static str, label: &str) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidQuantity {
            entry: label.to_owned(),
            field,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::FieldSchedule;

    fn entry(id: Option<Uuid>, start: &str, completion: &str) -> ProposedAllocation {
        ProposedAllocation {
            allocation_id: id,
            crop_id: Uuid::new_v4(),
            area_used: 10.0,
            total_cost: 40.0,
            expected_revenue: 100.0,
            profit: None,
            accumulated_gdd: 1200.0,
            start_date: start.to_owned(),
            completion_date: completion.to_owned(),
        }
    }

    fn proposal(entries: Vec<ProposedAllocation>) -> Proposal {
        Proposal {
            field_schedules: vec![FieldSchedule {
                field_id: Uuid::new_v4(),
                allocations: entries,
            }],
            ..Proposal::default()
        }
    }

    #[test]
    fn valid_entry_is_flattened_with_defaults() {
        let p = proposal(vec![entry(None, "2025-04-01", "2025-04-30")]);
        let desired = p.validate().expect("valid proposal");

        assert_eq!(desired.len(), 1);
        let d = &desired[0];
        assert_eq!(d.field_id, p.field_schedules[0].field_id);
        assert_eq!(d.profit, 60.0);
        assert_eq!(d.cultivation_days(), 30);
        assert_eq!(d.values().cultivation_days, 30);
        assert!(d.label.starts_with("new allocation #0"));
    }

    #[test]
    fn explicit_profit_wins_over_derived() {
        let mut e = entry(None, "2025-04-01", "2025-04-01");
        e.profit = Some(-5.0);
        let desired = proposal(vec![e]).validate().expect("valid");
        assert_eq!(desired[0].profit, -5.0);
        assert_eq!(desired[0].cultivation_days(), 1);
    }

    #[test]
    fn duplicate_ids_across_field_groups_are_rejected() {
        let id = Uuid::new_v4();
        let mut p = proposal(vec![entry(Some(id), "2025-04-01", "2025-05-01")]);
        p.field_schedules.push(FieldSchedule {
            field_id: Uuid::new_v4(),
            allocations: vec![entry(Some(id), "2025-06-01", "2025-07-01")],
        });

        let err = p.validate().unwrap_err();
        assert_eq!(err, ValidationError::DuplicateAllocationId(id));
    }

    #[test]
    fn malformed_date_names_the_entry_and_field() {
        let id = Uuid::new_v4();
        let err = proposal(vec![entry(Some(id), "2025-04-01", "2025/07/15")])
            .validate()
            .unwrap_err();

        match &err {
            ValidationError::MalformedDate { entry, field, value } => {
                assert_eq!(entry, &format!("allocation {id}"));
                assert_eq!(*field, "completion_date");
                assert_eq!(value, "2025/07/15");
            }
            other => panic!("expected MalformedDate, got {other:?}"),
        }
        assert!(err.to_string().contains("completion_date"));
    }

    #[test]
    fn inverted_dates_are_rejected() {
        let err = proposal(vec![entry(None, "2025-08-01", "2025-07-01")])
            .validate()
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvertedDates { .. }));
    }

    #[test]
    fn negative_area_is_rejected() {
        let mut e = entry(None, "2025-04-01", "2025-05-01");
        e.area_used = -1.0;
        let err = proposal(vec![e]).validate().unwrap_err();
        assert!(
            matches!(err, ValidationError::InvalidQuantity { field: "area_used", .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn negative_or_nan_gdd_is_rejected() {
        for bad in [-0.5, f64::NAN] {
            let mut e = entry(None, "2025-04-01", "2025-05-01");
            e.accumulated_gdd = bad;
            let err = proposal(vec![e]).validate().unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidQuantity { field: "accumulated_gdd", .. }),
                "got {err:?}"
            );
        }
    }

    #[test]
    fn empty_proposal_validates_to_nothing() {
        let desired = Proposal::default().validate().expect("valid");
        assert!(desired.is_empty());
    }
}
