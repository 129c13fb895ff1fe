use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::info;

use crate::config::DbConfig;

/// Migrations embedded at compile time from `crates/croplan-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Tables owned by croplan, parents before children.
pub const TABLES: &[&str] = &[
    "plans",
    "plan_fields",
    "plan_crops",
    "allocations",
    "schedule_entries",
    "schedule_items",
];

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a connection pool sized from the config.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to database at {}", config.database_url))
}

/// Apply pending embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;
    info!(migrations = MIGRATOR.iter().count(), "schema up to date");
    Ok(())
}

/// Create the configured database through the `postgres` maintenance
/// database if it is missing. Returns `true` when it was created.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<bool> {
    let db_name = config
        .database_name()
        .context("could not determine database name from URL")?;
    if !is_plain_identifier(db_name) {
        anyhow::bail!("database name {db_name:?} must be ASCII letters, digits and underscores");
    }

    let maintenance_url = config.maintenance_url();
    let maint_pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&maintenance_url)
        .await
        .with_context(|| format!("failed to connect to maintenance database at {maintenance_url}"))?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(db_name)
            .fetch_one(&maint_pool)
            .await
            .context("failed to query pg_database")?;

    let created = if exists {
        info!(db = db_name, "database already exists");
        false
    } else {
        maint_pool
            .execute(format!("CREATE DATABASE {db_name}").as_str())
            .await
            .with_context(|| format!("failed to create database {db_name}"))?;
        info!(db = db_name, "database created");
        true
    };

    maint_pool.close().await;
    Ok(created)
}

/// Row counts for every table in [`TABLES`], in that order.
pub async fn table_counts(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    let counts: Vec<(String, i64)> = sqlx::query_as(&count_query(TABLES))
        .fetch_all(pool)
        .await
        .context("failed to count table rows")?;
    Ok(counts)
}

/// `CREATE DATABASE` cannot take a bind parameter, so the name is
/// interpolated and must be a bare identifier.
fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn count_query(tables: &[&str]) -> String {
    let parts: Vec<String> = tables
        .iter()
        .enumerate()
        .map(|(i, t)| format!("SELECT {i} AS ord, '{t}'::text AS name, COUNT(*) AS n FROM {t}"))
        .collect();
    format!("SELECT name, n FROM ({}) c ORDER BY ord", parts.join(" UNION ALL "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(is_plain_identifier("croplan_test_0a1b"));
        assert!(!is_plain_identifier(""));
        assert!(!is_plain_identifier("croplan; DROP TABLE plans"));
        assert!(!is_plain_identifier("crop-plan"));
    }

    #[test]
    fn count_query_keeps_table_order() {
        let q = count_query(&["plans", "allocations"]);
        assert_eq!(
            q,
            "SELECT name, n FROM (\
             SELECT 0 AS ord, 'plans'::text AS name, COUNT(*) AS n FROM plans UNION ALL \
             SELECT 1 AS ord, 'allocations'::text AS name, COUNT(*) AS n FROM allocations\
             ) c ORDER BY ord"
        );
    }
}
