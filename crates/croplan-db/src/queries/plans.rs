//! Database query functions for the `plans` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgExecutor;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{Plan, PlanStatus, PredictionCache};

/// Columns that make up a [`Plan`] row. `prediction_cache` is excluded; it
/// is read and written through its own functions.
const PLAN_COLUMNS: &str = "id, name, planning_start_date, planning_end_date, status, \
     total_profit, total_revenue, total_cost, optimization_summary, created_at, updated_at";

/// Insert a new plan row in `pending` status with zero totals.
pub async fn insert_plan<'e, E>(
    executor: E,
    name: &str,
    planning_start_date: NaiveDate,
    planning_end_date: NaiveDate,
) -> Result<Plan>
where
    E: PgExecutor<'e>,
{
    let plan = sqlx::query_as::<_, Plan>(&format!(
        "INSERT INTO plans (name, planning_start_date, planning_end_date) \
         VALUES ($1, $2, $3) \
         RETURNING {PLAN_COLUMNS}"
    ))
    .bind(name)
    .bind(planning_start_date)
    .bind(planning_end_date)
    .fetch_one(executor)
    .await
    .context("failed to insert plan")?;

    Ok(plan)
}

/// Fetch a plan by its ID.
pub async fn get_plan<'e, E>(executor: E, id: Uuid) -> Result<Option<Plan>>
where
    E: PgExecutor<'e>,
{
    let plan = sqlx::query_as::<_, Plan>(&format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch plan")?;

    Ok(plan)
}

/// Fetch a plan and take a row lock on it for the rest of the enclosing
/// transaction. Concurrent callers for the same plan queue here.
pub async fn lock_plan_for_update<'e, E>(executor: E, id: Uuid) -> Result<Option<Plan>>
where
    E: PgExecutor<'e>,
{
    let plan = sqlx::query_as::<_, Plan>(&format!(
        "SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
    .context("failed to lock plan row")?;

    Ok(plan)
}

/// List all plans, ordered by creation time (newest first).
pub async fn list_plans<'e, E>(executor: E) -> Result<Vec<Plan>>
where
    E: PgExecutor<'e>,
{
    let plans = sqlx::query_as::<_, Plan>(&format!(
        "SELECT {PLAN_COLUMNS} FROM plans ORDER BY created_at DESC"
    ))
    .fetch_all(executor)
    .await
    .context("failed to list plans")?;

    Ok(plans)
}

/// Update the status of a plan.
pub async fn update_plan_status<'e, E>(executor: E, id: Uuid, status: PlanStatus) -> Result<()>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("UPDATE plans SET status = $1, updated_at = now() WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(executor)
        .await
        .context("failed to update plan status")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("plan {id} not found");
    }

    Ok(())
}

/// Recompute the plan's totals from its allocation rows and set its status,
/// in one statement. Returns the updated plan.
pub async fn refresh_totals<'e, E>(executor: E, id: Uuid, status: PlanStatus) -> Result<Plan>
where
    E: PgExecutor<'e>,
{
    let plan = sqlx::query_as::<_, Plan>(&format!(
        "UPDATE plans p \
         SET total_profit = s.profit, \
             total_revenue = s.revenue, \
             total_cost = s.cost, \
             status = $2, \
             updated_at = now() \
         FROM ( \
             SELECT COALESCE(SUM(profit), 0)::float8 AS profit, \
                    COALESCE(SUM(revenue), 0)::float8 AS revenue, \
                    COALESCE(SUM(cost), 0)::float8 AS cost \
             FROM allocations WHERE plan_id = $1 \
         ) s \
         WHERE p.id = $1 \
         RETURNING {}",
        qualified_plan_columns("p")
    ))
    .bind(id)
    .bind(status)
    .fetch_optional(executor)
    .await
    .context("failed to refresh plan totals")?;

    plan.with_context(|| format!("plan {id} not found"))
}

/// Store the optimizer's opaque summary on the plan.
pub async fn set_optimization_summary<'e, E>(
    executor: E,
    id: Uuid,
    summary: Option<&serde_json::Value>,
) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query("UPDATE plans SET optimization_summary = $1 WHERE id = $2")
        .bind(summary)
        .bind(id)
        .execute(executor)
        .await
        .context("failed to store optimization summary")?;

    Ok(())
}

/// Read the plan's prediction cache. The outer `None` means the plan does
/// not exist; the inner `None` means it has no cache yet.
pub async fn get_prediction_cache<'e, E>(
    executor: E,
    id: Uuid,
) -> Result<Option<Option<PredictionCache>>>
where
    E: PgExecutor<'e>,
{
    let row: Option<(Option<Json<PredictionCache>>,)> =
        sqlx::query_as("SELECT prediction_cache FROM plans WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
            .context("failed to read prediction cache")?;

    Ok(row.map(|(cache,)| cache.map(|Json(c)| c)))
}

/// Overwrite the plan's prediction cache wholesale.
pub async fn store_prediction_cache<'e, E>(
    executor: E,
    id: Uuid,
    cache: &PredictionCache,
) -> Result<()>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("UPDATE plans SET prediction_cache = $1 WHERE id = $2")
        .bind(Json(cache))
        .bind(id)
        .execute(executor)
        .await
        .context("failed to store prediction cache")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("plan {id} not found");
    }

    Ok(())
}

fn qualified_plan_columns(alias: &str) -> String {
    PLAN_COLUMNS
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
