//! Database query functions for the `plan_fields` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::PlanField;

/// Insert a field into a plan.
pub async fn insert_field<'e, E>(
    executor: E,
    plan_id: Uuid,
    name: &str,
    area: f64,
    daily_fixed_cost: f64,
) -> Result<PlanField>
where
    E: PgExecutor<'e>,
{
    let field = sqlx::query_as::<_, PlanField>(
        "INSERT INTO plan_fields (plan_id, name, area, daily_fixed_cost) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(plan_id)
    .bind(name)
    .bind(area)
    .bind(daily_fixed_cost)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert field {name:?}"))?;

    Ok(field)
}

/// List a plan's fields in creation order.
pub async fn list_fields_for_plan<'e, E>(executor: E, plan_id: Uuid) -> Result<Vec<PlanField>>
where
    E: PgExecutor<'e>,
{
    let fields = sqlx::query_as::<_, PlanField>(
        "SELECT * FROM plan_fields WHERE plan_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(plan_id)
    .fetch_all(executor)
    .await
    .context("failed to list fields for plan")?;

    Ok(fields)
}
