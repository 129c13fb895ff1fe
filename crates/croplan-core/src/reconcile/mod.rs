//! Merge a proposal into a plan's persisted allocations.
//!
//! [`apply`] validates the proposal, then inside one transaction holding the
//! plan's row lock:
//!
//! 1. partitions the proposal against the current set ([`diff::partition`]),
//! 2. rejects ids that are not in this plan and unresolved field/crop refs,
//! 3. updates matched rows in place and inserts new ones,
//! 4. detaches schedule entries from removed rows, then deletes them,
//! 5. stores the optimizer summary and recomputes totals with status
//!    `completed`.
//!
//! Any error drops the transaction, so nothing of the diff is observable.

pub mod diff;

use std::collections::{HashMap, HashSet};

use anyhow::Context;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use croplan_db::queries::{allocations, crops, fields, plans, schedules};

use crate::aggregate::{self, Outcome, Totals};
use crate::proposal::{DesiredAllocation, Proposal, ValidationError};

pub use diff::{Partition, partition};

/// Errors from [`apply`].
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid proposal: {0}")]
    Validation(#[from] ValidationError),

    #[error("plan {0} not found")]
    PlanNotFound(Uuid),

    #[error("reconcile failed: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl ReconcileError {
    /// Validation errors need a corrected proposal; everything else may
    /// succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Counts of what one successful [`apply`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReconcileSummary {
    pub updated_count: usize,
    pub created_count: usize,
    pub deleted_count: usize,
    /// Schedule entries whose allocation link was cleared.
    pub detached_schedule_count: u64,
    pub totals: Totals,
}

/// Apply `proposal` to the plan's allocation set atomically.
pub async fn apply(
    pool: &PgPool,
    plan_id: Uuid,
    proposal: &Proposal,
) -> Result<ReconcileSummary, ReconcileError> {
    let desired = proposal.validate().inspect_err(|e| {
        warn!(plan_id = %plan_id, error = %e, "rejected proposal");
    })?;

    let mut tx = pool
        .begin()
        .await
        .context("failed to begin reconcile transaction")?;

    // Serializes concurrent reconciles of the same plan.
    plans::lock_plan_for_update(&mut *tx, plan_id)
        .await?
        .ok_or(ReconcileError::PlanNotFound(plan_id))?;

    let current = allocations::list_allocations_for_plan(&mut *tx, plan_id).await?;
    let diff = partition(&current, &desired);

    if !diff.unknown.is_empty() {
        let owners = allocations::find_owning_plans(&mut *tx, &diff.unknown).await?;
        let err = classify_unknown(&diff.unknown, &owners);
        warn!(plan_id = %plan_id, error = %err, "rejected proposal");
        return Err(err.into());
    }

    let field_ids: HashSet<Uuid> = fields::list_fields_for_plan(&mut *tx, plan_id)
        .await?
        .into_iter()
        .map(|f| f.id)
        .collect();
    let crop_ids: HashSet<Uuid> = crops::list_crops_for_plan(&mut *tx, plan_id)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect();
    resolve_references(&desired, &field_ids, &crop_ids).inspect_err(|e| {
        warn!(plan_id = %plan_id, error = %e, "rejected proposal");
    })?;

    for (id, entry) in &diff.matched {
        allocations::update_allocation(&mut *tx, plan_id, *id, &entry.values()).await?;
        tracing::debug!(plan_id = %plan_id, allocation_id = %id, "updated allocation");
    }

    for entry in &diff.created {
        let row = allocations::insert_allocation(&mut *tx, plan_id, &entry.values()).await?;
        tracing::debug!(plan_id = %plan_id, allocation_id = %row.id, entry = %entry.label, "created allocation");
    }

    let detached = schedules::detach_allocations(&mut *tx, &diff.removed).await?;
    for id in &diff.removed {
        allocations::delete_allocation(&mut *tx, plan_id, *id).await?;
        tracing::debug!(plan_id = %plan_id, allocation_id = %id, "deleted allocation");
    }

    plans::set_optimization_summary(&mut *tx, plan_id, proposal.summary.as_ref()).await?;
    let totals = aggregate::recompute(&mut *tx, plan_id, Outcome::Succeeded).await?;

    tx.commit()
        .await
        .context("failed to commit reconcile transaction")?;

    let summary = ReconcileSummary {
        updated_count: diff.matched.len(),
        created_count: diff.created.len(),
        deleted_count: diff.removed.len(),
        detached_schedule_count: detached,
        totals,
    };

    info!(
        plan_id = %plan_id,
        updated = summary.updated_count,
        created = summary.created_count,
        deleted = summary.deleted_count,
        detached_schedules = detached,
        total_profit = totals.profit,
        "reconciled proposal"
    );

    Ok(summary)
}

/// Turn the first id not found in the plan into a validation error: either
/// it belongs to another plan, or it does not exist anywhere.
fn classify_unknown(unknown: &[Uuid], owners: &[(Uuid, Uuid)]) -> ValidationError {
    let owner_of: HashMap<Uuid, Uuid> = owners.iter().copied().collect();
    // `unknown` is non-empty when this is called.
    let first = unknown.first().copied().unwrap_or_default();

    match unknown.iter().find_map(|id| owner_of.get(id).map(|p| (*id, *p))) {
        Some((allocation_id, owner_plan_id)) => ValidationError::CrossPlanReference {
            allocation_id,
            owner_plan_id,
        },
        None => ValidationError::UnknownAllocation(first),
    }
}

fn resolve_references(
    desired: &[DesiredAllocation],
    field_ids: &HashSet<Uuid>,
    crop_ids: &HashSet<Uuid>,
) -> Result<(), ValidationError> {
    for entry in desired {
        if !field_ids.contains(&entry.field_id) {
            return Err(ValidationError::UnresolvedField {
                entry: entry.label.clone(),
                field_id: entry.field_id,
            });
        }
        if !crop_ids.contains(&entry.crop_id) {
            return Err(ValidationError::UnresolvedCrop {
                entry: entry.label.clone(),
                crop_id: entry.crop_id,
            });
        }
    }
    Ok(())
}
