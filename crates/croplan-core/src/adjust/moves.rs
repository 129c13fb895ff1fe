//! Move instructions and their in-memory application.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use croplan_db::models::Allocation;

use crate::proposal::ValidationError;
use crate::proposal::cultivation_days;

/// The only action the orchestrator understands.
pub const MOVE_ACTION: &str = "move";

/// A caller's edit to one existing allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveInstruction {
    pub allocation_id: Uuid,
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_field_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_completion_date: Option<NaiveDate>,
}

fn default_action() -> String {
    MOVE_ACTION.to_owned()
}

impl MoveInstruction {
    pub fn new(allocation_id: Uuid) -> Self {
        Self {
            allocation_id,
            action: default_action(),
            to_field_id: None,
            to_start_date: None,
            to_completion_date: None,
        }
    }

    pub fn to_field(mut self, field_id: Uuid) -> Self {
        self.to_field_id = Some(field_id);
        self
    }

    pub fn to_dates(mut self, start: Option<NaiveDate>, completion: Option<NaiveDate>) -> Self {
        self.to_start_date = start;
        self.to_completion_date = completion;
        self
    }
}

/// Apply `moves` to a copy of `current`. Storage is not touched.
///
/// Moves apply in order, so two moves of the same allocation compose. When
/// only a new start is given the allocation keeps its duration.
pub fn apply_moves(
    current: &[Allocation],
    plan_field_ids: &HashSet<Uuid>,
    moves: &[MoveInstruction],
) -> Result<Vec<Allocation>, ValidationError> {
    let mut candidates = current.to_vec();
    let index: HashMap<Uuid, usize> = candidates
        .iter()
        .enumerate()
        .map(|(i, a)| (a.id, i))
        .collect();

    for mv in moves {
        let invalid = |reason: String| ValidationError::InvalidMove {
            allocation_id: mv.allocation_id,
            reason,
        };

        if mv.action != MOVE_ACTION {
            return Err(invalid(format!("unsupported action {:?}", mv.action)));
        }
        let Some(&i) = index.get(&mv.allocation_id) else {
            return Err(invalid("allocation is not part of this plan".to_owned()));
        };
        let target = &mut candidates[i];

        if let Some(field_id) = mv.to_field_id {
            if !plan_field_ids.contains(&field_id) {
                return Err(invalid(format!("field {field_id} does not belong to this plan")));
            }
            target.field_id = field_id;
        }

        match (mv.to_start_date, mv.to_completion_date) {
            (Some(start), Some(completion)) => {
                target.start_date = start;
                target.completion_date = completion;
            }
            (Some(start), None) => {
                let duration = target.completion_date - target.start_date;
                target.completion_date = start
                    .checked_add_signed(duration)
                    .ok_or_else(|| invalid(format!("shifted completion overflows from {start}")))?;
                target.start_date = start;
            }
            (None, Some(completion)) => target.completion_date = completion,
            (None, None) => {}
        }

        if target.start_date > target.completion_date {
            return Err(invalid(format!(
                "start_date {} is after completion_date {}",
                target.start_date, target.completion_date
            )));
        }
        target.cultivation_days = cultivation_days(target.start_date, target.completion_date);
    }

    Ok(candidates)
}
