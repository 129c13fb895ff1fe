use std::collections::HashSet;

use uuid::Uuid;

use croplan_db::models::Allocation;

use crate::proposal::DesiredAllocation;

/// How a proposal splits against the current allocation set.
#[derive(Debug, Default)]
pub struct Partition<'a> {
    /// Existing allocation id paired with the entry that overwrites it.
    pub matched: Vec<(Uuid, &'a DesiredAllocation)>,
    /// Entries without an id; they become new rows.
    pub created: Vec<&'a DesiredAllocation>,
    /// Current ids no entry matched, in current-set order.
    pub removed: Vec<Uuid>,
    /// Ids named by the proposal that are not in this plan's set.
    pub unknown: Vec<Uuid>,
}

/// Partition `desired` against `current` by identity.
///
/// Entries whose id is not in `current` land in `unknown` rather than
/// `created`; the caller decides how to reject them.
pub fn partition<'a>(current: &[Allocation], desired: &'a [DesiredAllocation]) -> Partition<'a> {
    let current_ids: HashSet<Uuid> = current.iter().map(|a| a.id).collect();
    let mut out = Partition::default();
    let mut kept = HashSet::new();

    for entry in desired {
        match entry.allocation_id {
            Some(id) if current_ids.contains(&id) => {
                kept.insert(id);
                out.matched.push((id, entry));
            }
            Some(id) => out.unknown.push(id),
            None => out.created.push(entry),
        }
    }

    out.removed = current
        .iter()
        .map(|a| a.id)
        .filter(|id| !kept.contains(id))
        .collect();

    out
}
