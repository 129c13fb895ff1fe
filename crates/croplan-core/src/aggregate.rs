//! Plan-level totals and final status, derived from the allocation set.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

use croplan_db::models::{Allocation, Plan, PlanStatus};
use croplan_db::queries::plans;

/// Sum of the financial snapshot over a set of allocations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub profit: f64,
    pub revenue: f64,
    pub cost: f64,
}

impl Totals {
    pub fn from_allocations<'a>(allocations: impl IntoIterator<Item = &'a Allocation>) -> Self {
        allocations.into_iter().fold(Self::default(), |acc, a| Self {
            profit: acc.profit + a.profit,
            revenue: acc.revenue + a.revenue,
            cost: acc.cost + a.cost,
        })
    }

    pub fn of_plan(plan: &Plan) -> Self {
        Self {
            profit: plan.total_profit,
            revenue: plan.total_revenue,
            cost: plan.total_cost,
        }
    }
}

/// How the operation that triggered the recompute ended. Supplied by the
/// caller; never inferred here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
}

impl Outcome {
    fn status(self) -> PlanStatus {
        match self {
            Self::Succeeded => PlanStatus::Completed,
            Self::Failed => PlanStatus::Failed,
        }
    }
}

/// Recompute the plan's totals from its current allocations and set its
/// status from `outcome`. Runs against whatever executor the caller holds,
/// so the reconciler calls it inside its own transaction.
///
/// Idempotent: with no intervening allocation changes, a second call writes
/// the same totals.
pub async fn recompute<'e, E>(executor: E, plan_id: Uuid, outcome: Outcome) -> Result<Totals>
where
    E: PgExecutor<'e>,
{
    let plan = plans::refresh_totals(executor, plan_id, outcome.status()).await?;
    let totals = Totals::of_plan(&plan);

    tracing::debug!(
        plan_id = %plan_id,
        status = %plan.status,
        total_profit = totals.profit,
        total_revenue = totals.revenue,
        total_cost = totals.cost,
        "recomputed plan totals"
    );

    Ok(totals)
}

/// Mark a plan `failed` after an unsuccessful optimization attempt. Totals
/// are refreshed from the untouched allocation set.
pub async fn mark_failed<'e, E>(executor: E, plan_id: Uuid) -> Result<Totals>
where
    E: PgExecutor<'e>,
{
    recompute(executor, plan_id, Outcome::Failed).await
}
