//! Change planner - groups computed changes by operation

use crate::diff::ResourceChange;
use crate::types::{Operation, ReconciliationMode};
use log::debug;

/// Computed changes grouped by operation
#[derive(Debug, Clone, Default)]
pub struct ChangePlan {
    pub create: Vec<ResourceChange>,
    pub update: Vec<ResourceChange>,
    pub delete: Vec<ResourceChange>,
    /// Resources already converged
    pub unchanged: Vec<ResourceChange>,
    /// Changes the reconciliation mode does not admit; reported, never applied
    pub skipped: Vec<ResourceChange>,
}

impl ChangePlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Group `changes`, setting aside operations `mode` does not admit
    pub fn from_changes(
        changes: impl IntoIterator<Item = ResourceChange>,
        mode: ReconciliationMode,
    ) -> Self {
        let mut plan = Self::new();
        for change in changes {
            if mode.allows(change.operation()) {
                plan.add_change(change);
            } else {
                debug!(
                    "skipping {} {}/{}: not allowed in {mode:?} mode",
                    change.operation(),
                    change.kind(),
                    change.key()
                );
                plan.skipped.push(change);
            }
        }
        plan
    }

    /// Add a change to the group of its operation
    pub fn add_change(&mut self, change: ResourceChange) {
        match change.operation() {
            Operation::Create => self.create.push(change),
            Operation::Update => self.update.push(change),
            Operation::Delete => self.delete.push(change),
            Operation::None => self.unchanged.push(change),
        }
    }

    /// Changes for one operation
    pub fn for_operation(&self, operation: Operation) -> &[ResourceChange] {
        match operation {
            Operation::Create => &self.create,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
            Operation::None => &self.unchanged,
        }
    }

    /// Number of changes that modify the remote system
    pub fn total_changes(&self) -> usize {
        self.create.len() + self.update.len() + self.delete.len()
    }

    /// Number of resources in the plan, unchanged and skipped included
    pub fn total_resources(&self) -> usize {
        self.total_changes() + self.unchanged.len() + self.skipped.len()
    }

    /// Check if the plan modifies nothing
    pub fn is_empty(&self) -> bool {
        self.total_changes() == 0
    }

    /// All changes, modifying operations first
    pub fn iter(&self) -> impl Iterator<Item = &ResourceChange> {
        self.create
            .iter()
            .chain(&self.update)
            .chain(&self.delete)
            .chain(&self.unchanged)
            .chain(&self.skipped)
    }
}
