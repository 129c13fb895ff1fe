//! CLI handlers for `croplan plan` subcommands.
//!
//! Implements:
//! - `croplan plan create <file>`            -- create a plan from a TOML file
//! - `croplan plan show [plan-id]`           -- show plan details or list all plans
//! - `croplan plan snapshot <plan-id>`       -- print the optimizer baseline as JSON
//! - `croplan plan reconcile <plan-id> <f>`  -- apply a proposal JSON file
//! - `croplan plan adjust <plan-id> <f>`     -- apply moves and re-optimize

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use croplan_core::adjust::{MoveInstruction, PlanAdjuster};
use croplan_core::engine::Objective;
use croplan_core::proposal::Proposal;
use croplan_core::reconcile::{self, ReconcileSummary};
use croplan_core::snapshot;
use croplan_core::weather::PredictionCacheManager;
use croplan_db::models::Plan;
use croplan_db::queries::{crops, fields, plans, schedules};

use crate::PlanCommands;
use crate::config::CroplanConfig;

// -----------------------------------------------------------------------
// Public entry point
// -----------------------------------------------------------------------

/// Dispatch a `PlanCommands` variant to the appropriate handler.
pub async fn run_plan_command(
    command: PlanCommands,
    pool: &PgPool,
    config: &CroplanConfig,
) -> Result<()> {
    match command {
        PlanCommands::Create { file } => cmd_create(pool, &file).await,
        PlanCommands::Show { plan_id } => match plan_id {
            Some(id) => cmd_show_one(pool, &id).await,
            None => cmd_show_all(pool).await,
        },
        PlanCommands::Snapshot { plan_id } => cmd_snapshot(pool, &plan_id).await,
        PlanCommands::Reconcile { plan_id, file } => cmd_reconcile(pool, &plan_id, &file).await,
        PlanCommands::Adjust {
            plan_id,
            file,
            objective,
        } => cmd_adjust(pool, config, &plan_id, &file, objective).await,
    }
}

pub(crate) fn parse_plan_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("invalid plan ID: {raw}"))
}

// -----------------------------------------------------------------------
// croplan plan create <file>
// -----------------------------------------------------------------------

/// On-disk plan definition. Dates are ISO-8601 strings.
#[derive(Debug, Deserialize)]
pub struct PlanFile {
    pub name: String,
    pub planning_start_date: NaiveDate,
    pub planning_end_date: NaiveDate,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub crops: Vec<CropDef>,
}

#[derive(Debug, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub area: f64,
    #[serde(default)]
    pub daily_fixed_cost: f64,
}

#[derive(Debug, Deserialize)]
pub struct CropDef {
    pub name: String,
    pub variety: Option<String>,
}

pub fn parse_plan_file(content: &str) -> Result<PlanFile> {
    let file: PlanFile = toml::from_str(content).context("failed to parse plan file")?;
    if file.planning_start_date > file.planning_end_date {
        anyhow::bail!(
            "planning_start_date {} is after planning_end_date {}",
            file.planning_start_date,
            file.planning_end_date
        );
    }
    if let Some(f) = file.fields.iter().find(|f| !f.area.is_finite() || f.area < 0.0) {
        anyhow::bail!("field {:?} has invalid area {}", f.name, f.area);
    }
    Ok(file)
}

/// Insert the plan with its fields and crops in one transaction.
async fn create_plan(pool: &PgPool, file: &PlanFile) -> Result<Plan> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let plan = plans::insert_plan(
        &mut *tx,
        &file.name,
        file.planning_start_date,
        file.planning_end_date,
    )
    .await?;
    for f in &file.fields {
        fields::insert_field(&mut *tx, plan.id, &f.name, f.area, f.daily_fixed_cost).await?;
    }
    for c in &file.crops {
        crops::insert_crop(&mut *tx, plan.id, &c.name, c.variety.as_deref()).await?;
    }

    tx.commit().await.context("failed to commit plan")?;
    Ok(plan)
}

async fn cmd_create(pool: &PgPool, file_path: &str) -> Result<()> {
    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("failed to read plan file: {file_path}"))?;
    let file = parse_plan_file(&content)
        .with_context(|| format!("invalid plan file: {file_path}"))?;

    let plan = create_plan(pool, &file).await?;

    println!("Plan created successfully.");
    println!();
    println!("  Plan ID:  {}", plan.id);
    println!("  Name:     {}", plan.name);
    println!("  Horizon:  {} .. {}", plan.planning_start_date, plan.planning_end_date);
    println!("  Fields:   {}", file.fields.len());
    println!("  Crops:    {}", file.crops.len());

    Ok(())
}

// -----------------------------------------------------------------------
// croplan plan show
// -----------------------------------------------------------------------

async fn cmd_show_all(pool: &PgPool) -> Result<()> {
    let plans = plans::list_plans(pool).await?;

    if plans.is_empty() {
        println!("No plans found. Use `croplan plan create <file>` to create one.");
        return Ok(());
    }

    let mut counts: HashMap<Uuid, i64> = HashMap::new();
    for plan in &plans {
        let n = croplan_db::queries::allocations::count_allocations_for_plan(pool, plan.id).await?;
        counts.insert(plan.id, n);
    }

    let id_w = 36;
    let name_w = plans.iter().map(|p| p.name.len()).max().unwrap_or(4).max(4);
    let status_w = 10;

    println!(
        "{:<id_w$}  {:<name_w$}  {:<status_w$}  {:>6}  {:>12}  HORIZON",
        "ID", "NAME", "STATUS", "ALLOCS", "PROFIT",
    );
    for plan in &plans {
        let n = counts.get(&plan.id).copied().unwrap_or(0);
        println!(
            "{:<id_w$}  {:<name_w$}  {:<status_w$}  {:>6}  {:>12.2}  {}..{}",
            plan.id,
            plan.name,
            plan.status.to_string(),
            n,
            plan.total_profit,
            plan.planning_start_date,
            plan.planning_end_date,
        );
    }

    Ok(())
}

async fn cmd_show_one(pool: &PgPool, raw_id: &str) -> Result<()> {
    let plan_id = parse_plan_id(raw_id)?;
    let snap = snapshot::load_plan_snapshot(pool, plan_id)
        .await?
        .with_context(|| format!("plan {plan_id} not found"))?;
    let plan_fields = fields::list_fields_for_plan(pool, plan_id).await?;
    let plan_crops = crops::list_crops_for_plan(pool, plan_id).await?;
    let entries = schedules::list_schedule_entries_for_plan(pool, plan_id).await?;

    let field_names: HashMap<Uuid, &str> =
        plan_fields.iter().map(|f| (f.id, f.name.as_str())).collect();
    let crop_names: HashMap<Uuid, &str> =
        plan_crops.iter().map(|c| (c.id, c.name.as_str())).collect();

    let plan = &snap.plan;
    println!("Plan: {}", plan.name);
    println!("  ID:       {}", plan.id);
    println!("  Status:   {}", plan.status);
    println!("  Horizon:  {} .. {}", plan.planning_start_date, plan.planning_end_date);
    println!(
        "  Totals:   profit {:.2}  revenue {:.2}  cost {:.2}",
        plan.total_profit, plan.total_revenue, plan.total_cost
    );
    println!("  Fields:   {}", plan_fields.len());
    println!("  Crops:    {}", plan_crops.len());
    let unlinked = entries.iter().filter(|e| e.allocation_id.is_none()).count();
    println!("  Schedules: {} ({} unlinked)", entries.len(), unlinked);
    println!();

    if snap.allocations.is_empty() {
        println!("No allocations.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<12}  {:<12}  {:>8}  {:<10}  {:<10}  {:>10}",
        "ALLOCATION", "FIELD", "CROP", "AREA", "START", "COMPLETE", "PROFIT"
    );
    for a in &snap.allocations {
        println!(
            "{:<36}  {:<12}  {:<12}  {:>8.1}  {:<10}  {:<10}  {:>10.2}",
            a.id,
            field_names.get(&a.field_id).copied().unwrap_or("?"),
            crop_names.get(&a.crop_id).copied().unwrap_or("?"),
            a.area,
            a.start_date,
            a.completion_date,
            a.profit,
        );
    }

    Ok(())
}

// -----------------------------------------------------------------------
// croplan plan snapshot <plan-id>
// -----------------------------------------------------------------------

async fn cmd_snapshot(pool: &PgPool, raw_id: &str) -> Result<()> {
    let plan_id = parse_plan_id(raw_id)?;
    if plans::get_plan(pool, plan_id).await?.is_none() {
        anyhow::bail!("plan {plan_id} not found");
    }
    let snap = snapshot::load_allocation_snapshot(pool, plan_id).await?;
    let json = serde_json::to_string_pretty(&snap).context("failed to serialize snapshot")?;
    println!("{json}");
    Ok(())
}

// -----------------------------------------------------------------------
// croplan plan reconcile <plan-id> <proposal.json>
// -----------------------------------------------------------------------

async fn cmd_reconcile(pool: &PgPool, raw_id: &str, file_path: &str) -> Result<()> {
    let plan_id = parse_plan_id(raw_id)?;
    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("failed to read proposal file: {file_path}"))?;
    let proposal = Proposal::from_json(&content)
        .with_context(|| format!("failed to parse proposal file: {file_path}"))?;

    let summary = reconcile::apply(pool, plan_id, &proposal)
        .await
        .inspect_err(|e| {
            tracing::warn!(plan_id = %plan_id, retryable = e.is_retryable(), "reconcile failed");
        })?;
    print_summary(plan_id, &summary);
    Ok(())
}

fn print_summary(plan_id: Uuid, summary: &ReconcileSummary) {
    println!("Plan {plan_id} reconciled.");
    println!("  Updated:   {}", summary.updated_count);
    println!("  Created:   {}", summary.created_count);
    println!("  Deleted:   {}", summary.deleted_count);
    println!("  Detached schedules: {}", summary.detached_schedule_count);
    println!(
        "  Totals:    profit {:.2}  revenue {:.2}  cost {:.2}",
        summary.totals.profit, summary.totals.revenue, summary.totals.cost
    );
}

// -----------------------------------------------------------------------
// croplan plan adjust <plan-id> <moves.json>
// -----------------------------------------------------------------------

/// A moves file is either a bare array or `{"moves": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MovesFile {
    Bare(Vec<MoveInstruction>),
    Wrapped { moves: Vec<MoveInstruction> },
}

pub fn parse_moves(content: &str) -> Result<Vec<MoveInstruction>> {
    let parsed: MovesFile = serde_json::from_str(content).context("failed to parse moves")?;
    Ok(match parsed {
        MovesFile::Bare(moves) | MovesFile::Wrapped { moves } => moves,
    })
}

async fn cmd_adjust(
    pool: &PgPool,
    config: &CroplanConfig,
    raw_id: &str,
    file_path: &str,
    objective: Objective,
) -> Result<()> {
    let plan_id = parse_plan_id(raw_id)?;
    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("failed to read moves file: {file_path}"))?;
    let moves = parse_moves(&content).with_context(|| format!("invalid moves file: {file_path}"))?;

    let agrr = Arc::new(config.agrr());
    let weather = PredictionCacheManager::new(agrr.clone()).with_model(config.model.clone());
    let adjuster = PlanAdjuster::new(weather, agrr, config.adjust_config(objective));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(plan_id = %plan_id, "interrupt received; cancelling adjust");
            on_signal.cancel();
        }
    });

    let result = adjuster.adjust(pool, plan_id, &moves, &cancel).await;
    watcher.abort();
    let outcome = result.inspect_err(|e| {
        tracing::warn!(plan_id = %plan_id, retryable = e.is_retryable(), "adjust failed");
    })?;

    match (&outcome.reconciled, outcome.target_end_date) {
        (Some(summary), Some(end)) => {
            if let Some(source) = outcome.weather_source {
                println!("Weather: {source} through {end}");
            }
            print_summary(plan_id, summary);
        }
        _ => println!("No moves given; plan {plan_id} unchanged."),
    }
    println!("  Status:    {}", outcome.snapshot.plan.status);
    Ok(())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
