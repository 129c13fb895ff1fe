//! Views of a plan's current allocations.
//!
//! [`build_allocation_snapshot`] produces the baseline document the external
//! optimizer consumes on the next adjust cycle. [`PlanSnapshot`] is what
//! callers get back after an adjust: the plan row with refreshed totals and
//! its allocations.

use std::collections::HashMap;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use croplan_db::models::{Allocation, Plan, PlanCrop, PlanField};
use croplan_db::queries::{allocations, crops, fields, plans};

use crate::aggregate::Totals;

/// Current-allocation document for the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSnapshot {
    pub optimization_result: OptimizationResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub optimization_id: String,
    pub total_profit: f64,
    pub total_revenue: f64,
    pub total_cost: f64,
    pub field_schedules: Vec<FieldScheduleSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldScheduleSnapshot {
    pub field_id: Uuid,
    pub field_name: String,
    /// Declared capacity of the field.
    pub total_area: f64,
    /// Sum of allocation areas in this field.
    pub area_used: f64,
    pub utilization_rate: f64,
    pub total_cost: f64,
    pub total_revenue: f64,
    pub total_profit: f64,
    pub allocations: Vec<AllocationEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub allocation_id: Uuid,
    pub crop_id: Uuid,
    pub crop_name: String,
    pub start_date: NaiveDate,
    pub completion_date: NaiveDate,
    pub area: f64,
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
}

/// Build the optimizer baseline. Every field of the plan appears, in the
/// order given, even when it holds no allocations.
pub fn build_allocation_snapshot(
    plan_id: Uuid,
    fields: &[PlanField],
    crops: &[PlanCrop],
    allocations: &[Allocation],
) -> AllocationSnapshot {
    let crop_names: HashMap<Uuid, &str> = crops.iter().map(|c| (c.id, c.name.as_str())).collect();
    let mut by_field: HashMap<Uuid, Vec<&Allocation>> = HashMap::new();
    for a in allocations {
        by_field.entry(a.field_id).or_default().push(a);
    }

    let field_schedules = fields
        .iter()
        .map(|field| {
            let mut in_field = by_field.remove(&field.id).unwrap_or_default();
            in_field.sort_by_key(|a| (a.start_date, a.id));

            let area_used: f64 = in_field.iter().map(|a| a.area).sum();
            let totals = Totals::from_allocations(in_field.iter().copied());
            let utilization_rate = if field.area > 0.0 {
                area_used / field.area
            } else {
                0.0
            };

            FieldScheduleSnapshot {
                field_id: field.id,
                field_name: field.name.clone(),
                total_area: field.area,
                area_used,
                utilization_rate,
                total_cost: totals.cost,
                total_revenue: totals.revenue,
                total_profit: totals.profit,
                allocations: in_field
                    .into_iter()
                    .map(|a| AllocationEntry {
                        allocation_id: a.id,
                        crop_id: a.crop_id,
                        crop_name: crop_names.get(&a.crop_id).copied().unwrap_or_default().to_owned(),
                        start_date: a.start_date,
                        completion_date: a.completion_date,
                        area: a.area,
                        revenue: a.revenue,
                        cost: a.cost,
                        profit: a.profit,
                    })
                    .collect(),
            }
        })
        .collect();

    let totals = Totals::from_allocations(allocations);
    AllocationSnapshot {
        optimization_result: OptimizationResult {
            optimization_id: format!("opt_{plan_id}"),
            total_profit: totals.profit,
            total_revenue: totals.revenue,
            total_cost: totals.cost,
            field_schedules,
        },
    }
}

/// A plan with its refreshed totals and current allocations.
#[derive(Debug, Clone, Serialize)]
pub struct PlanSnapshot {
    pub plan: Plan,
    pub totals: Totals,
    pub allocations: Vec<Allocation>,
}

/// Load the plan and its allocations. `None` if the plan does not exist.
pub async fn load_plan_snapshot(pool: &PgPool, plan_id: Uuid) -> Result<Option<PlanSnapshot>> {
    let Some(plan) = plans::get_plan(pool, plan_id).await? else {
        return Ok(None);
    };
    let allocations = allocations::list_allocations_for_plan(pool, plan_id).await?;

    Ok(Some(PlanSnapshot {
        totals: Totals::of_plan(&plan),
        plan,
        allocations,
    }))
}

/// Load everything needed to build the optimizer baseline from storage.
pub async fn load_allocation_snapshot(pool: &PgPool, plan_id: Uuid) -> Result<AllocationSnapshot> {
    let fields = fields::list_fields_for_plan(pool, plan_id).await?;
    let crops = crops::list_crops_for_plan(pool, plan_id).await?;
    let allocations = allocations::list_allocations_for_plan(pool, plan_id).await?;
    Ok(build_allocation_snapshot(plan_id, &fields, &crops, &allocations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn field(name: &str, area: f64) -> PlanField {
        PlanField {
            id: Uuid::new_v4(),
            plan_id: Uuid::nil(),
            name: name.into(),
            area,
            daily_fixed_cost: 0.0,
            created_at: Utc::now(),
        }
    }

    fn crop(name: &str) -> PlanCrop {
        PlanCrop {
            id: Uuid::new_v4(),
            plan_id: Uuid::nil(),
            name: name.into(),
            variety: None,
            created_at: Utc::now(),
        }
    }

    fn alloc(field: &PlanField, crop: &PlanCrop, area: f64, start_month: u32, revenue: f64) -> Allocation {
        let start = NaiveDate::from_ymd_opt(2025, start_month, 1).unwrap();
        Allocation {
            id: Uuid::new_v4(),
            plan_id: Uuid::nil(),
            field_id: field.id,
            crop_id: crop.id,
            area,
            start_date: start,
            completion_date: start + chrono::Days::new(60),
            cultivation_days: 61,
            cost: 10.0,
            revenue,
            profit: revenue - 10.0,
            accumulated_gdd: 0.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn groups_by_field_with_totals_and_utilization() {
        let plan_id = Uuid::new_v4();
        let north = field("north", 100.0);
        let south = field("south", 0.0);
        let tomato = crop("tomato");
        let late = alloc(&north, &tomato, 30.0, 6, 100.0);
        let early = alloc(&north, &tomato, 20.0, 3, 50.0);

        let snap = build_allocation_snapshot(
            plan_id,
            &[north.clone(), south.clone()],
            &[tomato.clone()],
            &[late.clone(), early.clone()],
        );
        let result = &snap.optimization_result;

        assert_eq!(result.optimization_id, format!("opt_{plan_id}"));
        assert_eq!(result.total_revenue, 150.0);
        assert_eq!(result.total_cost, 20.0);
        assert_eq!(result.field_schedules.len(), 2);

        let n = &result.field_schedules[0];
        assert_eq!(n.field_name, "north");
        assert_eq!(n.area_used, 50.0);
        assert_eq!(n.total_area, 100.0);
        assert_eq!(n.utilization_rate, 0.5);
        assert_eq!(n.total_profit, 130.0);
        assert_eq!(n.allocations[0].allocation_id, early.id, "sorted by start date");
        assert_eq!(n.allocations[1].crop_name, "tomato");

        let s = &result.field_schedules[1];
        assert!(s.allocations.is_empty());
        assert_eq!(s.area_used, 0.0);
        assert_eq!(s.utilization_rate, 0.0, "zero-capacity field");
    }

    #[test]
    fn wire_shape_matches_optimizer_baseline() {
        let north = field("north", 10.0);
        let tomato = crop("tomato");
        let a = alloc(&north, &tomato, 5.0, 4, 20.0);
        let snap = build_allocation_snapshot(Uuid::nil(), &[north], &[tomato], &[a]);

        let v = serde_json::to_value(&snap).unwrap();
        let fs = &v["optimization_result"]["field_schedules"][0];
        for key in ["field_id", "field_name", "total_area", "area_used", "allocations"] {
            assert!(fs.get(key).is_some(), "missing {key}");
        }
        let entry = &fs["allocations"][0];
        for key in [
            "allocation_id",
            "crop_id",
            "crop_name",
            "start_date",
            "completion_date",
            "area",
            "revenue",
            "cost",
            "profit",
        ] {
            assert!(entry.get(key).is_some(), "missing {key}");
        }
        assert_eq!(entry["start_date"], "2025-04-01");
    }
}
