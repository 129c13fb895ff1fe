//! Transaction-scoped advisory locks.

use anyhow::{Context, Result};
use sqlx::PgExecutor;

/// Take a PostgreSQL advisory lock keyed by `key`, held until the enclosing
/// transaction commits or rolls back. Blocks while another transaction holds
/// the same key.
pub async fn acquire_xact_lock<'e, E>(executor: E, key: &str) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(key)
        .execute(executor)
        .await
        .with_context(|| format!("failed to acquire advisory lock {key:?}"))?;

    Ok(())
}

/// Try to take the advisory lock without waiting. Returns whether the lock
/// was acquired.
pub async fn try_acquire_xact_lock<'e, E>(executor: E, key: &str) -> Result<bool>
where
    E: PgExecutor<'e>,
{
    let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(key)
        .fetch_one(executor)
        .await
        .with_context(|| format!("failed to try advisory lock {key:?}"))?;

    Ok(acquired)
}
