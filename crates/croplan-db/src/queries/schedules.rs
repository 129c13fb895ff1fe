//! Database query functions for `schedule_entries` and `schedule_items`.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{ScheduleEntry, ScheduleItem};

/// Insert a schedule entry, optionally linked to an allocation.
pub async fn insert_schedule_entry<'e, E>(
    executor: E,
    plan_id: Uuid,
    allocation_id: Option<Uuid>,
    name: &str,
    category: &str,
) -> Result<ScheduleEntry>
where
    E: PgExecutor<'e>,
{
    let entry = sqlx::query_as::<_, ScheduleEntry>(
        "INSERT INTO schedule_entries (plan_id, allocation_id, name, category) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(plan_id)
    .bind(allocation_id)
    .bind(name)
    .bind(category)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert schedule entry {name:?}"))?;

    Ok(entry)
}

/// Insert a task item under a schedule entry.
pub async fn insert_schedule_item<'e, E>(
    executor: E,
    schedule_id: Uuid,
    name: &str,
    scheduled_date: Option<NaiveDate>,
) -> Result<ScheduleItem>
where
    E: PgExecutor<'e>,
{
    let item = sqlx::query_as::<_, ScheduleItem>(
        "INSERT INTO schedule_items (schedule_id, name, scheduled_date) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(schedule_id)
    .bind(name)
    .bind(scheduled_date)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert schedule item {name:?}"))?;

    Ok(item)
}

/// Get a schedule entry by id.
pub async fn get_schedule_entry<'e, E>(executor: E, id: Uuid) -> Result<Option<ScheduleEntry>>
where
    E: PgExecutor<'e>,
{
    let entry = sqlx::query_as::<_, ScheduleEntry>("SELECT * FROM schedule_entries WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch schedule entry")?;

    Ok(entry)
}

/// List all schedule entries of a plan, linked or not.
pub async fn list_schedule_entries_for_plan<'e, E>(
    executor: E,
    plan_id: Uuid,
) -> Result<Vec<ScheduleEntry>>
where
    E: PgExecutor<'e>,
{
    let entries = sqlx::query_as::<_, ScheduleEntry>(
        "SELECT * FROM schedule_entries WHERE plan_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(plan_id)
    .fetch_all(executor)
    .await
    .context("failed to list schedule entries")?;

    Ok(entries)
}

/// List the items of a schedule entry.
pub async fn list_schedule_items<'e, E>(executor: E, schedule_id: Uuid) -> Result<Vec<ScheduleItem>>
where
    E: PgExecutor<'e>,
{
    let items = sqlx::query_as::<_, ScheduleItem>(
        "SELECT * FROM schedule_items WHERE schedule_id = $1 \
         ORDER BY scheduled_date ASC NULLS LAST, id ASC",
    )
    .bind(schedule_id)
    .fetch_all(executor)
    .await
    .context("failed to list schedule items")?;

    Ok(items)
}

/// Clear the allocation link on every schedule entry that points at one of
/// `allocation_ids`. The entries and their items are kept. Returns the
/// number of entries detached.
pub async fn detach_allocations<'e, E>(executor: E, allocation_ids: &[Uuid]) -> Result<u64>
where
    E: PgExecutor<'e>,
{
    if allocation_ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        "UPDATE schedule_entries SET allocation_id = NULL WHERE allocation_id = ANY($1)",
    )
    .bind(allocation_ids)
    .execute(executor)
    .await
    .context("failed to detach schedule entries")?;

    Ok(result.rows_affected())
}
