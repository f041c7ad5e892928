//! Outcome types of a reconcile pass.

use serde::{Deserialize, Serialize};

use crate::applicator::ApplyAction;
use crate::finalizer::Lifecycle;

/// What one pass did to one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetAction {
    /// The remote copy was missing and was created.
    Created,
    /// The remote copy differed and was updated.
    Updated,
    /// The remote copy already matched.
    Unchanged,
    /// The target holds the master object itself; nothing to do.
    SameIdentity,
    /// The remote copy was deleted.
    Deleted,
    /// The remote copy was already gone.
    AlreadyAbsent,
}

impl TargetAction {
    /// Whether the action wrote to the target.
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Created | Self::Updated | Self::Deleted)
    }
}

impl From<ApplyAction> for TargetAction {
    fn from(action: ApplyAction) -> Self {
        match action {
            ApplyAction::Created => Self::Created,
            ApplyAction::Updated => Self::Updated,
            ApplyAction::Unchanged => Self::Unchanged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: String,
    pub action: TargetAction,
}

impl TargetReport {
    pub fn new(target: impl Into<String>, action: TargetAction) -> Self {
        Self {
            target: target.into(),
            action,
        }
    }
}

/// Result of a successful pass over one master object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    /// Name of the master object.
    pub name: String,
    /// Lifecycle phase observed at the start of the pass. `None` when the
    /// master object no longer exists.
    pub phase: Option<Lifecycle>,
    /// One report per target visited, in visiting order.
    pub targets: Vec<TargetReport>,
}

impl ReconcileOutcome {
    /// Outcome for a master object that is gone.
    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phase: None,
            targets: Vec::new(),
        }
    }

    pub fn new(name: impl Into<String>, phase: Lifecycle) -> Self {
        Self {
            name: name.into(),
            phase: Some(phase),
            targets: Vec::new(),
        }
    }

    pub fn push(&mut self, target: impl Into<String>, action: TargetAction) {
        self.targets.push(TargetReport::new(target, action));
    }

    /// Whether the master object was gone.
    pub const fn is_absent(&self) -> bool {
        self.phase.is_none()
    }

    /// Number of writes performed on targets.
    pub fn writes(&self) -> usize {
        self.targets.iter().filter(|t| t.action.is_write()).count()
    }

    /// Whether every target was already in its desired state.
    pub fn is_converged(&self) -> bool {
        self.writes() == 0
    }

    /// Action taken on `target`, if it was visited.
    pub fn action_for(&self, target: &str) -> Option<TargetAction> {
        self.targets
            .iter()
            .find(|t| t.target == target)
            .map(|t| t.action)
    }
}
