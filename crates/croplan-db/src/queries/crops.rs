//! Database query functions for the `plan_crops` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::PlanCrop;

/// Insert a crop into a plan.
pub async fn insert_crop<'e, E>(
    executor: E,
    plan_id: Uuid,
    name: &str,
    variety: Option<&str>,
) -> Result<PlanCrop>
where
    E: PgExecutor<'e>,
{
    let crop = sqlx::query_as::<_, PlanCrop>(
        "INSERT INTO plan_crops (plan_id, name, variety) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(plan_id)
    .bind(name)
    .bind(variety)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert crop {name:?}"))?;

    Ok(crop)
}

/// List a plan's crops in creation order.
pub async fn list_crops_for_plan<'e, E>(executor: E, plan_id: Uuid) -> Result<Vec<PlanCrop>>
where
    E: PgExecutor<'e>,
{
    let crops = sqlx::query_as::<_, PlanCrop>(
        "SELECT * FROM plan_crops WHERE plan_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(plan_id)
    .fetch_all(executor)
    .await
    .context("failed to list crops for plan")?;

    Ok(crops)
}
