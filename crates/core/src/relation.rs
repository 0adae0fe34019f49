//! Minimal add/remove sets for many-to-many relationships.
//!
//! Reconciling a relationship with these sets leaves members that are neither
//! desired-new nor observed-stale untouched, so out-of-band additions by other
//! writers survive an update.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDiff<T: Ord> {
    pub to_add: BTreeSet<T>,
    pub to_remove: BTreeSet<T>,
}

impl<T: Ord> Default for RelationDiff<T> {
    fn default() -> Self {
        Self { to_add: BTreeSet::new(), to_remove: BTreeSet::new() }
    }
}

impl<T: Ord> RelationDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// `to_add = desired − observed`, `to_remove = observed − desired`.
pub fn diff<T: Ord + Clone>(desired: &BTreeSet<T>, observed: &BTreeSet<T>) -> RelationDiff<T> {
    RelationDiff {
        to_add: desired.difference(observed).cloned().collect(),
        to_remove: observed.difference(desired).cloned().collect(),
    }
}
