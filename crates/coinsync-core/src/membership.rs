//! Ranked-membership change detection.
//!
//! The tracker starts [`MembershipTracker::Uninitialized`]. The first observed
//! snapshot becomes the baseline without reporting a change; from then on it is
//! [`MembershipTracker::Tracking`] and never goes back.

use std::collections::BTreeSet;

use serde::Serialize;

/// Ids that entered or left the ranked set between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MembershipDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl MembershipDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Pure set difference: `added = current - previous`, `removed = previous - current`.
pub fn diff(previous: &BTreeSet<String>, current: &BTreeSet<String>) -> MembershipDiff {
    MembershipDiff {
        added: current.difference(previous).cloned().collect(),
        removed: previous.difference(current).cloned().collect(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MembershipTracker {
    #[default]
    Uninitialized,
    Tracking(BTreeSet<String>),
}

impl MembershipTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn is_tracking(&self) -> bool {
        matches!(self, Self::Tracking(_))
    }

    /// The baseline set, if one exists.
    pub fn current(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Uninitialized => None,
            Self::Tracking(set) => Some(set),
        }
    }

    /// Replace the baseline with `current`.
    ///
    /// Returns a change only when tracking and something was added or removed.
    pub fn observe(&mut self, current: BTreeSet<String>) -> Option<MembershipDiff> {
        let change = match self {
            Self::Uninitialized => None,
            Self::Tracking(previous) => Some(diff(previous, &current)).filter(|d| !d.is_empty()),
        };
        *self = Self::Tracking(current);
        change
    }
}
