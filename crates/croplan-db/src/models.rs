use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Status of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Optimizing,
    Completed,
    Failed,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Optimizing => "optimizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanStatus {
    type Err = PlanStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "optimizing" => Ok(Self::Optimizing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(PlanStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PlanStatus`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid plan status: {0:?}")]
pub struct PlanStatusParseError(pub String);

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A cultivation plan. The `prediction_cache` blob is deliberately not part
/// of this row; read it through `queries::plans::get_prediction_cache`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub planning_start_date: NaiveDate,
    pub planning_end_date: NaiveDate,
    pub status: PlanStatus,
    pub total_profit: f64,
    pub total_revenue: f64,
    pub total_cost: f64,
    pub optimization_summary: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A field available to a plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanField {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub name: String,
    /// Declared capacity.
    pub area: f64,
    pub daily_fixed_cost: f64,
    pub created_at: DateTime<Utc>,
}

/// A crop available to a plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanCrop {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub name: String,
    pub variety: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One crop growing in one field for a date range within a plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Allocation {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub field_id: Uuid,
    pub crop_id: Uuid,
    pub area: f64,
    pub start_date: NaiveDate,
    pub completion_date: NaiveDate,
    pub cultivation_days: i32,
    pub cost: f64,
    pub revenue: f64,
    pub profit: f64,
    pub accumulated_gdd: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task schedule, weakly linked to the allocation it was generated for.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduleEntry {
    pub id: Uuid,
    pub plan_id: Uuid,
    /// `None` once the allocation has been removed ("unlinked").
    pub allocation_id: Option<Uuid>,
    pub name: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

/// A single task within a [`ScheduleEntry`].
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduleItem {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub name: String,
    pub scheduled_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Prediction cache (stored as JSONB on `plans.prediction_cache`)
// ---------------------------------------------------------------------------

/// One day of weather. Metrics other than `date` are carried verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyWeather {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub metrics: serde_json::Map<String, serde_json::Value>,
}

/// The cached weather prediction series owned by a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionCache {
    pub data: Vec<DailyWeather>,
    pub prediction_start_date: NaiveDate,
    pub prediction_end_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    #[serde(rename = "model", alias = "model_identifier")]
    pub model_identifier: String,
}

impl PredictionCache {
    /// Whether the declared bounds enclose `[start, end]`. Says nothing about
    /// gaps in `data`.
    pub fn covers(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.prediction_start_date <= start && self.prediction_end_date >= end
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
