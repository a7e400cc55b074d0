use std::collections::BTreeSet;

use serde::Serialize;

use super::snapshot::{EntityId, EntitySnapshot};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftResult {
    pub added: BTreeSet<EntityId>,
    pub removed: BTreeSet<EntityId>,
}

impl DriftResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Ids present only in `current` are added; ids present only in `prior` are
/// removed. Labels are not compared.
pub fn diff(prior: &EntitySnapshot, current: &EntitySnapshot) -> DriftResult {
    let added = current
        .ids()
        .filter(|id| !prior.contains(id))
        .map(str::to_string)
        .collect();
    let removed = prior
        .ids()
        .filter(|id| !current.contains(id))
        .map(str::to_string)
        .collect();
    DriftResult { added, removed }
}
