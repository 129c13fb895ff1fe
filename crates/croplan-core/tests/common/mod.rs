//! Fake engines and fixtures shared by the croplan-core integration tests.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;

use croplan_core::engine::{AdjustRequest, Optimizer, PredictionRequest, PredictionSeries, Predictor};
use croplan_core::proposal::{FieldSchedule, Proposal, ProposedAllocation};
use croplan_db::models::{DailyWeather, PredictionCache};
use croplan_db::queries::plans;

// ===========================================================================
// Weather fixtures
// ===========================================================================

pub fn daily_series(start: NaiveDate, end: NaiveDate) -> Vec<DailyWeather> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(|date| {
            let mut metrics = serde_json::Map::new();
            metrics.insert("temperature_mean".into(), serde_json::json!(12.0));
            metrics.insert("precipitation".into(), serde_json::json!(0.5));
            DailyWeather { date, metrics }
        })
        .collect()
}

pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> usize {
    ((end - start).num_days() + 1) as usize
}

/// Store a contiguous cache for `[start, end]` directly.
pub async fn seed_cache(pool: &PgPool, plan_id: uuid::Uuid, start: NaiveDate, end: NaiveDate) -> PredictionCache {
    let cache = PredictionCache {
        data: daily_series(start, end),
        prediction_start_date: start,
        prediction_end_date: end,
        generated_at: Utc::now() - chrono::Duration::days(1),
        model_identifier: "seeded".into(),
    };
    plans::store_prediction_cache(pool, plan_id, &cache)
        .await
        .expect("seed prediction cache");
    cache
}

pub async fn stored_cache(pool: &PgPool, plan_id: uuid::Uuid) -> Option<PredictionCache> {
    plans::get_prediction_cache(pool, plan_id)
        .await
        .expect("read prediction cache")
        .flatten()
}

// ===========================================================================
// Fake predictor
// ===========================================================================

#[derive(Default)]
pub struct FakePredictor {
    calls: AtomicUsize,
    delay: Duration,
    missing_day: Option<NaiveDate>,
    fail: bool,
    requests: Mutex<Vec<PredictionRequest>>,
}

impl FakePredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn with_missing_day(day: NaiveDate) -> Self {
        Self {
            missing_day: Some(day),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<PredictionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Predictor for FakePredictor {
    fn name(&self) -> &str {
        "fake"
    }

    async fn predict(&self, request: &PredictionRequest) -> Result<PredictionSeries> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            anyhow::bail!("prediction model unavailable");
        }

        let mut data = daily_series(request.start_date, request.end_date);
        if let Some(day) = self.missing_day {
            data.retain(|r| r.date != day);
        }
        Ok(PredictionSeries {
            data,
            prediction_start_date: Some(request.start_date),
            prediction_end_date: Some(request.end_date),
            predicted_at: Some(Utc::now()),
            model: Some(request.model.clone()),
        })
    }
}

// ===========================================================================
// Fake optimizer
// ===========================================================================

/// What the fake optimizer does when called.
pub enum OptimizerBehaviour {
    /// Return the candidate allocations unchanged (moves accepted as-is).
    Echo,
    /// Return the candidate allocations with one id duplicated.
    DuplicateIds,
    Fail,
    /// Echo after sleeping.
    Slow(Duration),
}

pub struct FakeOptimizer {
    behaviour: OptimizerBehaviour,
    calls: AtomicUsize,
    requests: Mutex<Vec<AdjustRequest>>,
}

impl FakeOptimizer {
    pub fn new(behaviour: OptimizerBehaviour) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<AdjustRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

/// Turn the candidate snapshot back into a proposal that keeps every id.
pub fn echo_proposal(request: &AdjustRequest) -> Proposal {
    let result = &request.current_allocation.optimization_result;
    Proposal {
        summary: Some(serde_json::json!({ "algorithm": "echo" })),
        total_profit: Some(result.total_profit),
        total_revenue: Some(result.total_revenue),
        total_cost: Some(result.total_cost),
        field_schedules: result
            .field_schedules
            .iter()
            .map(|fs| FieldSchedule {
                field_id: fs.field_id,
                allocations: fs
                    .allocations
                    .iter()
                    .map(|a| ProposedAllocation {
                        allocation_id: Some(a.allocation_id),
                        crop_id: a.crop_id,
                        area_used: a.area,
                        total_cost: a.cost,
                        expected_revenue: a.revenue,
                        profit: Some(a.profit),
                        accumulated_gdd: 0.0,
                        start_date: a.start_date.to_string(),
                        completion_date: a.completion_date.to_string(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

#[async_trait]
impl Optimizer for FakeOptimizer {
    fn name(&self) -> &str {
        "fake"
    }

    async fn adjust(&self, request: &AdjustRequest) -> Result<Proposal> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        match &self.behaviour {
            OptimizerBehaviour::Echo => Ok(echo_proposal(request)),
            OptimizerBehaviour::DuplicateIds => {
                let mut proposal = echo_proposal(request);
                if let Some(fs) = proposal.field_schedules.iter_mut().find(|fs| !fs.allocations.is_empty()) {
                    let dup = fs.allocations[0].clone();
                    fs.allocations.push(dup);
                }
                Ok(proposal)
            }
            OptimizerBehaviour::Fail => anyhow::bail!("optimizer exited with status 1"),
            OptimizerBehaviour::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(echo_proposal(request))
            }
        }
    }
}
