//! Per-plan weather prediction cache.
//!
//! [`PredictionCacheManager::resolve`] returns a series covering the
//! requested range, reusing the plan's cached series when it covers the range
//! without gaps. Otherwise it regenerates the request widened to the old
//! cache's bounds in one predictor call and overwrites the cache wholesale,
//! so a miss never shrinks coverage. The read, the predictor call, and the write all happen
//! inside one transaction holding a per-plan advisory lock, so a concurrent
//! resolve for the same plan waits and then sees the fresh cache.

pub mod coverage;

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use croplan_db::models::{DailyWeather, PredictionCache};
use croplan_db::queries::{locks, plans};

use crate::engine::{PredictionRequest, PredictionSeries, Predictor};

pub use coverage::CoverageGap;

/// Model identifier requested when none is configured.
pub const DEFAULT_MODEL: &str = "lightgbm";

/// Errors from [`PredictionCacheManager::resolve`]. None of them leaves a
/// partial cache behind.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("plan {0} not found")]
    PlanNotFound(Uuid),

    #[error("invalid prediction range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("weather predictor failed: {0:#}")]
    Predictor(#[source] anyhow::Error),

    #[error("weather predictor returned incomplete coverage: {0}")]
    IncompleteCoverage(#[from] CoverageGap),

    #[error("prediction cache storage failed: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl WeatherError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::PlanNotFound(_) | Self::InvalidRange { .. })
    }
}

/// Where a resolved series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    Cached,
    Regenerated,
}

impl fmt::Display for CacheSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cached => "cached",
            Self::Regenerated => "regenerated",
        })
    }
}

/// A series covering exactly `[prediction_start_date, prediction_end_date]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedWeather {
    pub source: CacheSource,
    pub data: Vec<DailyWeather>,
    pub prediction_start_date: NaiveDate,
    pub prediction_end_date: NaiveDate,
    pub model: String,
}

impl ResolvedWeather {
    /// The series in the engine's payload shape.
    pub fn to_series(&self) -> PredictionSeries {
        PredictionSeries {
            data: self.data.clone(),
            prediction_start_date: Some(self.prediction_start_date),
            prediction_end_date: Some(self.prediction_end_date),
            predicted_at: None,
            model: Some(self.model.clone()),
        }
    }
}

/// Advisory-lock key guarding one plan's cache.
pub fn cache_lock_key(plan_id: Uuid) -> String {
    format!("croplan:prediction_cache:{plan_id}")
}

/// Resolves prediction requests against the per-plan cache.
#[derive(Clone)]
pub struct PredictionCacheManager {
    predictor: Arc<dyn Predictor>,
    model: String,
}

impl PredictionCacheManager {
    pub fn new(predictor: Arc<dyn Predictor>) -> Self {
        Self {
            predictor,
            model: DEFAULT_MODEL.to_owned(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Resolve from the plan's `planning_start_date` to `target_end_date`.
    pub async fn resolve(
        &self,
        pool: &PgPool,
        plan_id: Uuid,
        target_end_date: NaiveDate,
    ) -> Result<ResolvedWeather, WeatherError> {
        let plan = plans::get_plan(pool, plan_id)
            .await?
            .ok_or(WeatherError::PlanNotFound(plan_id))?;
        self.resolve_range(pool, plan_id, plan.planning_start_date, target_end_date)
            .await
    }

    /// Resolve an explicit `[effective_start_date, target_end_date]` range.
    pub async fn resolve_range(
        &self,
        pool: &PgPool,
        plan_id: Uuid,
        effective_start_date: NaiveDate,
        target_end_date: NaiveDate,
    ) -> Result<ResolvedWeather, WeatherError> {
        let (start, end) = (effective_start_date, target_end_date);
        if start > end {
            return Err(WeatherError::InvalidRange { start, end });
        }

        let mut tx = pool
            .begin()
            .await
            .context("failed to begin prediction cache transaction")?;
        locks::acquire_xact_lock(&mut *tx, &cache_lock_key(plan_id)).await?;

        let cached = plans::get_prediction_cache(&mut *tx, plan_id)
            .await?
            .ok_or(WeatherError::PlanNotFound(plan_id))?;

        let (predict_start, predict_end) = match cached {
            Some(cache) => match usable_range(&cache, start, end) {
                Ok(()) => {
                    tx.commit()
                        .await
                        .context("failed to release prediction cache lock")?;
                    info!(
                        plan_id = %plan_id,
                        start = %start,
                        end = %end,
                        cached_end = %cache.prediction_end_date,
                        "prediction cache hit"
                    );
                    return Ok(ResolvedWeather {
                        source: CacheSource::Cached,
                        data: coverage::slice(&cache.data, start, end),
                        prediction_start_date: start,
                        prediction_end_date: end,
                        model: cache.model_identifier,
                    });
                }
                Err(reason) => {
                    info!(
                        plan_id = %plan_id,
                        start = %start,
                        end = %end,
                        reason = %reason,
                        "prediction cache miss"
                    );
                    regeneration_range(&cache, start, end)
                }
            },
            None => {
                info!(plan_id = %plan_id, start = %start, end = %end, "prediction cache empty");
                (start, end)
            }
        };

        let request = PredictionRequest {
            start_date: predict_start,
            end_date: predict_end,
            model: self.model.clone(),
        };
        let series = self
            .predictor
            .predict(&request)
            .await
            .map_err(WeatherError::Predictor)?;

        if let Err(gap) = coverage::check(&series.data, predict_start, predict_end) {
            warn!(
                plan_id = %plan_id,
                predictor = self.predictor.name(),
                gap = %gap,
                "discarding prediction with incomplete coverage"
            );
            return Err(gap.into());
        }

        let cache = PredictionCache {
            data: coverage::slice(&series.data, predict_start, predict_end),
            prediction_start_date: predict_start,
            prediction_end_date: predict_end,
            generated_at: series.predicted_at.unwrap_or_else(Utc::now),
            model_identifier: series.model.unwrap_or_else(|| self.model.clone()),
        };
        plans::store_prediction_cache(&mut *tx, plan_id, &cache).await?;
        tx.commit()
            .await
            .context("failed to commit prediction cache")?;

        info!(
            plan_id = %plan_id,
            start = %predict_start,
            end = %predict_end,
            days = cache.data.len(),
            "prediction cache regenerated"
        );

        Ok(ResolvedWeather {
            source: CacheSource::Regenerated,
            data: coverage::slice(&cache.data, start, end),
            prediction_start_date: start,
            prediction_end_date: end,
            model: cache.model_identifier,
        })
    }
}

/// Why a cached series cannot serve `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unusable {
    OutOfBounds {
        cached_start: NaiveDate,
        cached_end: NaiveDate,
    },
    Gap(CoverageGap),
}

impl fmt::Display for Unusable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds {
                cached_start,
                cached_end,
            } => write!(f, "cache covers {cached_start}..={cached_end}"),
            Self::Gap(gap) => write!(f, "cached series untrustworthy: {gap}"),
        }
    }
}

/// Range to predict on a miss: the request widened to the old cache's
/// bounds, so a regeneration never narrows what was already covered.
fn regeneration_range(cache: &PredictionCache, start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
    (
        start.min(cache.prediction_start_date),
        end.max(cache.prediction_end_date),
    )
}

fn usable_range(cache: &PredictionCache, start: NaiveDate, end: NaiveDate) -> Result<(), Unusable> {
    if !cache.covers(start, end) {
        return Err(Unusable::OutOfBounds {
            cached_start: cache.prediction_start_date,
            cached_end: cache.prediction_end_date,
        });
    }
    coverage::check(&cache.data, start, end).map_err(Unusable::Gap)
}
