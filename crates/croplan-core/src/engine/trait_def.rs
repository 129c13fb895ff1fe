//! The [`Predictor`] and [`Optimizer`] traits.
//!
//! Both are object-safe so callers can hold `Arc<dyn Predictor>` and
//! `Arc<dyn Optimizer>` and swap in fakes under test.

use anyhow::Result;
use async_trait::async_trait;

use super::types::{AdjustRequest, PredictionRequest, PredictionSeries};
use crate::proposal::Proposal;

/// Produces a daily weather prediction series.
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Short name for logs (e.g. "agrr").
    fn name(&self) -> &str;

    /// Predict weather for every day of `[request.start_date,
    /// request.end_date]`. Implementations may return more days than asked;
    /// the caller checks coverage.
    async fn predict(&self, request: &PredictionRequest) -> Result<PredictionSeries>;
}

/// Re-optimizes a plan's allocations after a set of moves.
#[async_trait]
pub trait Optimizer: Send + Sync {
    fn name(&self) -> &str;

    /// Return a complete proposal for the plan. The proposal replaces the
    /// current allocation set when reconciled.
    async fn adjust(&self, request: &AdjustRequest) -> Result<Proposal>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Predictor, _: &dyn Optimizer) {}
};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;
    use croplan_db::models::DailyWeather;

    struct FlatPredictor;

    #[async_trait]
    impl Predictor for FlatPredictor {
        fn name(&self) -> &str {
            "flat"
        }

        async fn predict(&self, request: &PredictionRequest) -> Result<PredictionSeries> {
            let data = request
                .start_date
                .iter_days()
                .take_while(|d| *d <= request.end_date)
                .map(|date| DailyWeather {
                    date,
                    metrics: serde_json::Map::new(),
                })
                .collect();
            Ok(PredictionSeries {
                data,
                prediction_start_date: Some(request.start_date),
                prediction_end_date: Some(request.end_date),
                predicted_at: None,
                model: Some(request.model.clone()),
            })
        }
    }

    #[tokio::test]
    async fn predictor_is_usable_as_trait_object() {
        let predictor: Arc<dyn Predictor> = Arc::new(FlatPredictor);
        let request = PredictionRequest {
            start_date: NaiveDate::from_ymd_opt(2024, 2, 27).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            model: "lightgbm".into(),
        };

        let series = predictor.predict(&request).await.expect("predict");
        assert_eq!(predictor.name(), "flat");
        // 2024 is a leap year: Feb 27, 28, 29, Mar 1.
        assert_eq!(series.data.len(), 4);
        assert_eq!(series.model.as_deref(), Some("lightgbm"));
    }
}
