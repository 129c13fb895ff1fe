//! Plan adjustment: apply move instructions, re-optimize with weather that
//! covers the moved horizon, and reconcile the optimizer's proposal.
//!
//! Status flow: the plan is marked `optimizing` once the moves validate. The
//! reconciler marks it `completed`; any later failure (weather, optimizer,
//! reconcile, cancellation) marks it `failed` and leaves the committed
//! allocations untouched.

pub mod horizon;
pub mod moves;

pub use moves::{MoveInstruction, apply_moves};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use croplan_db::models::{Allocation, Plan, PlanCrop, PlanField, PlanStatus};
use croplan_db::queries::{allocations, crops, fields, plans};

use crate::aggregate;
use crate::engine::{AdjustRequest, CropSpec, FieldSpec, Objective, Optimizer};
use crate::proposal::ValidationError;
use crate::reconcile::{self, ReconcileError, ReconcileSummary};
use crate::snapshot::{self, PlanSnapshot};
use crate::weather::{CacheSource, PredictionCacheManager, WeatherError};

/// Knobs for [`PlanAdjuster`].
#[derive(Debug, Clone)]
pub struct AdjustConfig {
    /// Whole years added past the furthest completion year when a move
    /// leaves the declared horizon.
    pub lookahead_years: u32,
    pub optimizer_timeout: Duration,
    pub objective: Objective,
}

impl Default for AdjustConfig {
    fn default() -> Self {
        Self {
            lookahead_years: 0,
            optimizer_timeout: Duration::from_secs(600),
            objective: Objective::default(),
        }
    }
}

/// Errors from [`PlanAdjuster::adjust`].
#[derive(Debug, Error)]
pub enum AdjustError {
    #[error("invalid moves: {0}")]
    Validation(#[from] ValidationError),

    #[error("plan {0} not found")]
    PlanNotFound(Uuid),

    #[error(transparent)]
    Weather(#[from] WeatherError),

    #[error("optimizer failed: {0:#}")]
    Optimizer(#[source] anyhow::Error),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("adjustment cancelled")]
    Cancelled,

    #[error("adjust failed: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl AdjustError {
    /// Everything except bad input may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::PlanNotFound(_) => false,
            Self::Weather(e) => e.is_retryable(),
            Self::Reconcile(e) => e.is_retryable(),
            Self::Optimizer(_) | Self::Cancelled | Self::Storage(_) => true,
        }
    }
}

/// Result of a successful adjust.
#[derive(Debug, Clone, Serialize)]
pub struct AdjustOutcome {
    pub snapshot: PlanSnapshot,
    /// `None` when there was nothing to do.
    pub weather_source: Option<CacheSource>,
    pub target_end_date: Option<NaiveDate>,
    pub reconciled: Option<ReconcileSummary>,
}

/// Drives one adjust cycle per call.
#[derive(Clone)]
pub struct PlanAdjuster {
    weather: PredictionCacheManager,
    optimizer: Arc<dyn Optimizer>,
    config: AdjustConfig,
}

/// Plan state loaded once per adjust.
struct Candidate<'a> {
    plan: &'a Plan,
    fields: &'a [PlanField],
    crops: &'a [PlanCrop],
    allocations: &'a [Allocation],
    moves: &'a [MoveInstruction],
}

struct Applied {
    weather_source: CacheSource,
    target_end_date: NaiveDate,
    summary: ReconcileSummary,
}

impl PlanAdjuster {
    pub fn new(
        weather: PredictionCacheManager,
        optimizer: Arc<dyn Optimizer>,
        config: AdjustConfig,
    ) -> Self {
        Self {
            weather,
            optimizer,
            config,
        }
    }

    /// Apply `moves` to the plan and re-optimize. An empty move list returns
    /// the current snapshot without predicting, optimizing, or writing.
    pub async fn adjust(
        &self,
        pool: &PgPool,
        plan_id: Uuid,
        moves: &[MoveInstruction],
        cancel: &CancellationToken,
    ) -> Result<AdjustOutcome, AdjustError> {
        let plan = plans::get_plan(pool, plan_id)
            .await?
            .ok_or(AdjustError::PlanNotFound(plan_id))?;

        if moves.is_empty() {
            info!(plan_id = %plan_id, "no moves; nothing to adjust");
            return Ok(AdjustOutcome {
                snapshot: self.snapshot(pool, plan_id).await?,
                weather_source: None,
                target_end_date: None,
                reconciled: None,
            });
        }

        let current = allocations::list_allocations_for_plan(pool, plan_id).await?;
        let plan_fields = fields::list_fields_for_plan(pool, plan_id).await?;
        let plan_crops = crops::list_crops_for_plan(pool, plan_id).await?;
        let field_ids: HashSet<Uuid> = plan_fields.iter().map(|f| f.id).collect();

        let candidates = apply_moves(&current, &field_ids, moves).inspect_err(|e| {
            warn!(plan_id = %plan_id, error = %e, "rejected moves");
        })?;

        plans::update_plan_status(pool, plan_id, PlanStatus::Optimizing).await?;
        info!(plan_id = %plan_id, moves = moves.len(), "adjusting plan");

        let candidate = Candidate {
            plan: &plan,
            fields: &plan_fields,
            crops: &plan_crops,
            allocations: &candidates,
            moves,
        };

        let applied = match self.optimize_and_apply(pool, &candidate, cancel).await {
            Ok(applied) => applied,
            Err(err) => {
                warn!(plan_id = %plan_id, error = %err, "adjust failed; marking plan failed");
                if let Err(mark_err) = aggregate::mark_failed(pool, plan_id).await {
                    warn!(plan_id = %plan_id, error = %mark_err, "failed to mark plan failed");
                }
                return Err(err);
            }
        };

        Ok(AdjustOutcome {
            snapshot: self.snapshot(pool, plan_id).await?,
            weather_source: Some(applied.weather_source),
            target_end_date: Some(applied.target_end_date),
            reconciled: Some(applied.summary),
        })
    }

    async fn optimize_and_apply(
        &self,
        pool: &PgPool,
        candidate: &Candidate<'_>,
        cancel: &CancellationToken,
    ) -> Result<Applied, AdjustError> {
        let plan = candidate.plan;
        let start = horizon::effective_start_date(plan.planning_start_date, candidate.allocations);
        let end = horizon::target_end_date(
            plan.planning_end_date,
            candidate.allocations,
            self.config.lookahead_years,
        );

        let weather = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AdjustError::Cancelled),
            resolved = self.weather.resolve_range(pool, plan.id, start, end) => resolved?,
        };

        let request = AdjustRequest {
            plan_id: plan.id,
            current_allocation: snapshot::build_allocation_snapshot(
                plan.id,
                candidate.fields,
                candidate.crops,
                candidate.allocations,
            ),
            moves: candidate.moves.to_vec(),
            fields: candidate.fields.iter().map(FieldSpec::from).collect(),
            crops: candidate.crops.iter().map(CropSpec::from).collect(),
            weather: weather.to_series(),
            planning_start: start,
            planning_end: end,
            objective: self.config.objective,
        };

        let timeout = self.config.optimizer_timeout;
        let proposal = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AdjustError::Cancelled),
            outcome = tokio::time::timeout(timeout, self.optimizer.adjust(&request)) => match outcome {
                Ok(Ok(proposal)) => proposal,
                Ok(Err(e)) => return Err(AdjustError::Optimizer(e)),
                Err(_) => {
                    return Err(AdjustError::Optimizer(anyhow::anyhow!(
                        "optimizer {} timed out after {}s",
                        self.optimizer.name(),
                        timeout.as_secs_f64()
                    )));
                }
            },
        };

        if cancel.is_cancelled() {
            return Err(AdjustError::Cancelled);
        }

        let summary = reconcile::apply(pool, plan.id, &proposal).await?;

        Ok(Applied {
            weather_source: weather.source,
            target_end_date: end,
            summary,
        })
    }

    async fn snapshot(&self, pool: &PgPool, plan_id: Uuid) -> Result<PlanSnapshot, AdjustError> {
        snapshot::load_plan_snapshot(pool, plan_id)
            .await?
            .ok_or(AdjustError::PlanNotFound(plan_id))
    }
}
