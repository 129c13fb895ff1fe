//! Database query functions for the `allocations` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::Allocation;

/// Column values written for an allocation, on insert and on update alike.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllocationValues {
    pub field_id: Uuid,
    pub crop_id: Uuid,
    pub area: f64,
    pub start_date: NaiveDate,
    pub completion_date: NaiveDate,
    pub cultivation_days: i32,
    pub cost: f64,
    pub revenue: f64,
    pub profit: f64,
    pub accumulated_gdd: f64,
}

/// Insert a new allocation into a plan. The database assigns the id.
pub async fn insert_allocation<'e, E>(
    executor: E,
    plan_id: Uuid,
    values: &AllocationValues,
) -> Result<Allocation>
where
    E: PgExecutor<'e>,
{
    let allocation = sqlx::query_as::<_, Allocation>(
        "INSERT INTO allocations (plan_id, field_id, crop_id, area, start_date, \
         completion_date, cultivation_days, cost, revenue, profit, accumulated_gdd) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         RETURNING *",
    )
    .bind(plan_id)
    .bind(values.field_id)
    .bind(values.crop_id)
    .bind(values.area)
    .bind(values.start_date)
    .bind(values.completion_date)
    .bind(values.cultivation_days)
    .bind(values.cost)
    .bind(values.revenue)
    .bind(values.profit)
    .bind(values.accumulated_gdd)
    .fetch_one(executor)
    .await
    .context("failed to insert allocation")?;

    Ok(allocation)
}

/// Overwrite every value column of an existing allocation in place. The id
/// and plan are untouched, so schedule back-references stay valid.
pub async fn update_allocation<'e, E>(
    executor: E,
    plan_id: Uuid,
    id: Uuid,
    values: &AllocationValues,
) -> Result<Allocation>
where
    E: PgExecutor<'e>,
{
    let allocation = sqlx::query_as::<_, Allocation>(
        "UPDATE allocations \
         SET field_id = $3, crop_id = $4, area = $5, start_date = $6, \
             completion_date = $7, cultivation_days = $8, cost = $9, \
             revenue = $10, profit = $11, accumulated_gdd = $12, updated_at = now() \
         WHERE id = $1 AND plan_id = $2 \
         RETURNING *",
    )
    .bind(id)
    .bind(plan_id)
    .bind(values.field_id)
    .bind(values.crop_id)
    .bind(values.area)
    .bind(values.start_date)
    .bind(values.completion_date)
    .bind(values.cultivation_days)
    .bind(values.cost)
    .bind(values.revenue)
    .bind(values.profit)
    .bind(values.accumulated_gdd)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to update allocation {id}"))?;

    allocation.with_context(|| format!("allocation {id} not found in plan {plan_id}"))
}

/// Delete one allocation. Fails if a schedule entry still references it.
pub async fn delete_allocation<'e, E>(executor: E, plan_id: Uuid, id: Uuid) -> Result<()>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM allocations WHERE id = $1 AND plan_id = $2")
        .bind(id)
        .bind(plan_id)
        .execute(executor)
        .await
        .with_context(|| format!("failed to delete allocation {id}"))?;

    if result.rows_affected() == 0 {
        anyhow::bail!("allocation {id} not found in plan {plan_id}");
    }

    Ok(())
}

/// List a plan's allocations ordered by start date, then id.
pub async fn list_allocations_for_plan<'e, E>(executor: E, plan_id: Uuid) -> Result<Vec<Allocation>>
where
    E: PgExecutor<'e>,
{
    let allocations = sqlx::query_as::<_, Allocation>(
        "SELECT * FROM allocations WHERE plan_id = $1 ORDER BY start_date ASC, id ASC",
    )
    .bind(plan_id)
    .fetch_all(executor)
    .await
    .context("failed to list allocations for plan")?;

    Ok(allocations)
}

/// Count the allocations in a plan.
pub async fn count_allocations_for_plan<'e, E>(executor: E, plan_id: Uuid) -> Result<i64>
where
    E: PgExecutor<'e>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM allocations WHERE plan_id = $1")
        .bind(plan_id)
        .fetch_one(executor)
        .await
        .context("failed to count allocations")?;

    Ok(count)
}

/// For each id in `ids`, return the plan that owns it, if any. Ids that do
/// not exist at all are absent from the result.
pub async fn find_owning_plans<'e, E>(executor: E, ids: &[Uuid]) -> Result<Vec<(Uuid, Uuid)>>
where
    E: PgExecutor<'e>,
{
    let rows: Vec<(Uuid, Uuid)> =
        sqlx::query_as("SELECT id, plan_id FROM allocations WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(executor)
            .await
            .context("failed to look up allocation owners")?;

    Ok(rows)
}
