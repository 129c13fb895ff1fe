//! CLI handler for `croplan weather resolve`.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;

use croplan_core::weather::PredictionCacheManager;

use crate::config::CroplanConfig;
use crate::plan_cmds::parse_plan_id;

/// Resolve weather for a plan through `until` and report where it came from.
/// With `json`, the resolved series is printed instead of a summary.
pub async fn run_resolve(
    pool: &PgPool,
    config: &CroplanConfig,
    raw_id: &str,
    until: NaiveDate,
    json: bool,
) -> Result<()> {
    let plan_id = parse_plan_id(raw_id)?;
    let manager =
        PredictionCacheManager::new(Arc::new(config.agrr())).with_model(config.model.clone());

    let resolved = manager
        .resolve(pool, plan_id, until)
        .await
        .inspect_err(|e| {
            tracing::warn!(plan_id = %plan_id, retryable = e.is_retryable(), "weather resolve failed");
        })?;

    if json {
        let out = serde_json::to_string_pretty(&resolved.to_series())
            .context("failed to serialize weather series")?;
        println!("{out}");
        return Ok(());
    }

    println!("Weather for plan {plan_id}:");
    println!("  Source:  {}", resolved.source);
    println!(
        "  Range:   {} .. {} ({} days)",
        resolved.prediction_start_date,
        resolved.prediction_end_date,
        resolved.data.len()
    );
    println!("  Model:   {}", resolved.model);
    Ok(())
}
