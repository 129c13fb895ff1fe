//! Request and response types exchanged with the external engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use croplan_db::models::{DailyWeather, PlanCrop, PlanField};

use crate::adjust::MoveInstruction;
use crate::snapshot::AllocationSnapshot;

/// Ask the predictor for `[start_date, end_date]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub model: String,
}

/// Weather prediction payload as emitted by the engine. Only `data` is
/// required; the declared bounds are informational and re-derived by the
/// cache manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSeries {
    pub data: Vec<DailyWeather>,
    #[serde(default)]
    pub prediction_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub prediction_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub predicted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub model: Option<String>,
}

/// What the optimizer should optimize for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    MaximizeProfit,
    MinimizeCost,
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MaximizeProfit => "maximize_profit",
            Self::MinimizeCost => "minimize_cost",
        })
    }
}

impl FromStr for Objective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "maximize_profit" => Ok(Self::MaximizeProfit),
            "minimize_cost" => Ok(Self::MinimizeCost),
            other => Err(format!(
                "invalid objective {other:?} (expected maximize_profit or minimize_cost)"
            )),
        }
    }
}

/// A field as handed to the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field_id: Uuid,
    pub name: String,
    pub area: f64,
    pub daily_fixed_cost: f64,
}

impl From<&PlanField> for FieldSpec {
    fn from(field: &PlanField) -> Self {
        Self {
            field_id: field.id,
            name: field.name.clone(),
            area: field.area,
            daily_fixed_cost: field.daily_fixed_cost,
        }
    }
}

/// A crop as handed to the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropSpec {
    pub crop_id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variety: Option<String>,
}

impl From<&PlanCrop> for CropSpec {
    fn from(crop: &PlanCrop) -> Self {
        Self {
            crop_id: crop.id,
            name: crop.name.clone(),
            variety: crop.variety.clone(),
        }
    }
}

/// Everything the optimizer needs to re-plan after a set of moves.
#[derive(Debug, Clone)]
pub struct AdjustRequest {
    pub plan_id: Uuid,
    /// The candidate allocation set, moves already applied.
    pub current_allocation: AllocationSnapshot,
    pub moves: Vec<MoveInstruction>,
    pub fields: Vec<FieldSpec>,
    pub crops: Vec<CropSpec>,
    /// Weather covering `[planning_start, planning_end]`.
    pub weather: PredictionSeries,
    pub planning_start: NaiveDate,
    pub planning_end: NaiveDate,
    pub objective: Objective,
}
