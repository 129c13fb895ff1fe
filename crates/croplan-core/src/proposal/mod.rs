//! Allocation proposals produced by the external optimizer.
//!
//! A [`Proposal`] is the raw wire document; [`Proposal::validate`] turns it
//! into a flat list of [`DesiredAllocation`]s or rejects it with a
//! [`ValidationError`] before anything touches storage.

mod validate;

pub use validate::{DesiredAllocation, ValidationError};
pub(crate) use validate::cultivation_days;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An externally computed candidate allocation set for one plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Opaque optimizer summary, stored on the plan as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_profit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_revenue: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    #[serde(default)]
    pub field_schedules: Vec<FieldSchedule>,
}

/// The allocations proposed for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchedule {
    pub field_id: Uuid,
    #[serde(default)]
    pub allocations: Vec<ProposedAllocation>,
}

/// One proposed allocation. A missing `allocation_id` means "create new".
///
/// Dates are kept as strings here so that a malformed value can be reported
/// against the allocation that carried it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAllocation {
    #[serde(default)]
    pub allocation_id: Option<Uuid>,
    pub crop_id: Uuid,
    #[serde(alias = "area")]
    pub area_used: f64,
    #[serde(default, alias = "cost")]
    pub total_cost: f64,
    #[serde(default, alias = "revenue")]
    pub expected_revenue: f64,
    /// Defaults to `expected_revenue - total_cost` when absent.
    #[serde(default)]
    pub profit: Option<f64>,
    #[serde(default)]
    pub accumulated_gdd: f64,
    pub start_date: String,
    pub completion_date: String,
}

impl Proposal {
    /// Parse a proposal from JSON text.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Number of allocation entries across all field groups.
    pub fn allocation_count(&self) -> usize {
        self.field_schedules.iter().map(|fs| fs.allocations.len()).sum()
    }

    /// Validate the proposal in isolation (no storage access).
    pub fn validate(&self) -> Result<Vec<DesiredAllocation>, ValidationError> {
        validate::validate_proposal(self)
    }
}
