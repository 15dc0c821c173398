//! Core types for reconciliation

use crate::diff::ResourceChange;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Operation needed to bring one attribute or resource to its desired state
///
/// Variants are ordered so that `None` sorts before every real change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// Nothing to do
    None,
    /// Create the resource or attribute
    Create,
    /// Update the resource or attribute
    Update,
    /// Delete the resource or attribute
    Delete,
}

impl Operation {
    /// Check if this operation represents a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Derive a resource-level operation from its attribute changes
    ///
    /// `Update` as soon as one attribute changes, `None` otherwise.
    pub fn from_changes(changes: &[StateChange]) -> Self {
        if changes.iter().any(|c| c.operation().is_change()) {
            Self::Update
        } else {
            Self::None
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "NONE",
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Transition of a single named attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    name: String,
    before: Option<Value>,
    after: Option<Value>,
    operation: Operation,
}

impl StateChange {
    /// Create a change whose operation is derived from the two values
    pub fn new(name: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        let operation = match (&before, &after) {
            (None, None) => Operation::None,
            (None, Some(_)) => Operation::Create,
            (Some(_), None) => Operation::Delete,
            (Some(b), Some(a)) if b == a => Operation::None,
            (Some(_), Some(_)) => Operation::Update,
        };
        Self {
            name: name.into(),
            before,
            after,
            operation,
        }
    }

    /// Create a change compared against a "no value" sentinel
    ///
    /// When `after` equals `sentinel` the desired state does not care about
    /// the attribute: the change is recorded with `Operation::None` whatever
    /// `before` is. A sentinel `before` gets no special treatment.
    pub fn with_sentinel(
        name: impl Into<String>,
        before: Option<Value>,
        after: Value,
        sentinel: &Value,
    ) -> Self {
        if &after == sentinel {
            return Self {
                name: name.into(),
                before,
                after: Some(after),
                operation: Operation::None,
            };
        }
        Self::new(name, before, Some(after))
    }

    /// Attribute name (e.g. `partitions`, `config.retention.ms`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value before the change
    pub fn before(&self) -> Option<&Value> {
        self.before.as_ref()
    }

    /// Value after the change
    pub fn after(&self) -> Option<&Value> {
        self.after.as_ref()
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |v: Option<&Value>| v.map_or_else(|| "∅".to_string(), Value::to_string);
        write!(
            f,
            "{}: {} → {} ({})",
            self.name,
            render(self.before.as_ref()),
            render(self.after.as_ref()),
            self.operation
        )
    }
}

/// Outcome status of one computed change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeStatus {
    /// The remote system was modified
    Changed,
    /// Nothing needed to be done
    Ok,
    /// The remote call for this resource failed
    Failed,
    /// Computed but not applied
    DryRun,
}

/// Result of reconciling one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeResult {
    pub status: ChangeStatus,
    pub change: ResourceChange,
    pub error: Option<String>,
}

impl ChangeResult {
    pub fn changed(change: ResourceChange) -> Self {
        Self {
            status: ChangeStatus::Changed,
            change,
            error: None,
        }
    }

    pub fn ok(change: ResourceChange) -> Self {
        Self {
            status: ChangeStatus::Ok,
            change,
            error: None,
        }
    }

    pub fn failed(change: ResourceChange, error: impl Into<String>) -> Self {
        Self {
            status: ChangeStatus::Failed,
            change,
            error: Some(error.into()),
        }
    }

    pub fn dry_run(change: ResourceChange) -> Self {
        Self {
            status: ChangeStatus::DryRun,
            change,
            error: None,
        }
    }

    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        self.status != ChangeStatus::Failed
    }
}

/// Which operations a reconciliation is allowed to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconciliationMode {
    /// Only create missing resources
    Create,
    /// Only update existing resources
    Update,
    /// Only delete resources
    Delete,
    /// Create and update, never delete
    #[default]
    ApplyNonDelete,
    /// Create, update and delete
    ApplyAll,
}

impl ReconciliationMode {
    /// Check if a computed operation may be applied in this mode
    ///
    /// `Operation::None` is always admitted so that unchanged resources
    /// still get a result.
    pub fn allows(&self, operation: Operation) -> bool {
        match operation {
            Operation::None => true,
            Operation::Create => {
                matches!(self, Self::Create | Self::ApplyNonDelete | Self::ApplyAll)
            }
            Operation::Update => {
                matches!(self, Self::Update | Self::ApplyNonDelete | Self::ApplyAll)
            }
            Operation::Delete => matches!(self, Self::Delete | Self::ApplyAll),
        }
    }

    /// Whether observed resources missing from the desired state are deleted
    pub fn deletes_orphans(&self) -> bool {
        matches!(self, Self::Delete | Self::ApplyAll)
    }
}

impl FromStr for ReconciliationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "apply-non-delete" => Ok(Self::ApplyNonDelete),
            "apply-all" => Ok(Self::ApplyAll),
            other => Err(format!("unknown reconciliation mode: {other}")),
        }
    }
}

/// Options for one reconciliation call
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    pub mode: ReconciliationMode,
    /// Compute changes but never invoke a change handler
    pub dry_run: bool,
}

impl ReconcileOptions {
    pub fn new(mode: ReconciliationMode, dry_run: bool) -> Self {
        Self { mode, dry_run }
    }
}

/// Summary of reconciliation results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub changed: usize,
    pub ok: usize,
    pub failed: usize,
    pub dry_run: usize,
}

impl ReconcileSummary {
    /// Build a summary from a list of results
    pub fn from_results(results: &[ChangeResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.add_result(result);
        }
        summary
    }

    /// Check if reconciliation was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources reported
    pub fn total(&self) -> usize {
        self.changed + self.ok + self.failed + self.dry_run
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ReconcileSummary) {
        self.changed += other.changed;
        self.ok += other.ok;
        self.failed += other.failed;
        self.dry_run += other.dry_run;
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ChangeResult) {
        match result.status {
            ChangeStatus::Changed => self.changed += 1,
            ChangeStatus::Ok => self.ok += 1,
            ChangeStatus::Failed => self.failed += 1,
            ChangeStatus::DryRun => self.dry_run += 1,
        }
    }
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} changed, {} ok, {} failed, {} dry-run",
            self.changed, self.ok, self.failed, self.dry_run
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_change_derives_operation() {
        assert_eq!(
            StateChange::new("p", None, Some(json!(3))).operation(),
            Operation::Create
        );
        assert_eq!(
            StateChange::new("p", Some(json!(3)), None).operation(),
            Operation::Delete
        );
        assert_eq!(
            StateChange::new("p", Some(json!(3)), Some(json!(3))).operation(),
            Operation::None
        );
        assert_eq!(
            StateChange::new("p", Some(json!(3)), Some(json!(5))).operation(),
            Operation::Update
        );
    }

    #[test]
    fn test_sentinel_after_suppresses_update() {
        let change = StateChange::with_sentinel("replicas", Some(json!(3)), json!(-1), &json!(-1));
        assert_eq!(change.operation(), Operation::None);

        let change = StateChange::with_sentinel("replicas", Some(json!(-1)), json!(2), &json!(-1));
        assert_eq!(change.operation(), Operation::Update);
    }

    #[test]
    fn test_operation_order() {
        assert!(Operation::None < Operation::Create);
        assert!(Operation::None < Operation::Update);
        assert!(Operation::None < Operation::Delete);
    }

    #[test]
    fn test_operation_from_changes() {
        let unchanged = vec![StateChange::new("a", Some(json!(1)), Some(json!(1)))];
        assert_eq!(Operation::from_changes(&unchanged), Operation::None);

        let changed = vec![
            StateChange::new("a", Some(json!(1)), Some(json!(1))),
            StateChange::new("config.x", None, Some(json!("y"))),
        ];
        assert_eq!(Operation::from_changes(&changed), Operation::Update);
    }

    #[test]
    fn test_summary_from_results_and_merge() {
        let resource = crate::resource::Resource::new("Counter", "test/v1", "a", 0);
        let change = |op| ResourceChange::new("a", &resource, op, Vec::new());
        let first = ReconcileSummary::from_results(&[
            ChangeResult::changed(change(Operation::Create)),
            ChangeResult::ok(change(Operation::None)),
        ]);
        let second = ReconcileSummary::from_results(&[
            ChangeResult::failed(change(Operation::Update), "boom"),
            ChangeResult::dry_run(change(Operation::Delete)),
        ]);
        assert!(first.is_success());
        assert!(!second.is_success());

        let mut total = first;
        total.merge(&second);
        assert_eq!(total.total(), 4);
        assert_eq!((total.changed, total.ok, total.failed, total.dry_run), (1, 1, 1, 1));
        assert_eq!(total.to_string(), "1 changed, 1 ok, 1 failed, 1 dry-run");
    }

    #[test]
    fn test_mode_allows() {
        let mode = ReconciliationMode::ApplyNonDelete;
        assert!(mode.allows(Operation::Create));
        assert!(mode.allows(Operation::Update));
        assert!(!mode.allows(Operation::Delete));
        assert!(!mode.deletes_orphans());

        assert!(ReconciliationMode::ApplyAll.deletes_orphans());
        assert!(!ReconciliationMode::Create.allows(Operation::Update));
        assert!(ReconciliationMode::Delete.allows(Operation::None));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!(
            "apply_all".parse::<ReconciliationMode>().unwrap(),
            ReconciliationMode::ApplyAll
        );
        assert_eq!(
            "APPLY-NON-DELETE".parse::<ReconciliationMode>().unwrap(),
            ReconciliationMode::ApplyNonDelete
        );
        assert!("upsert".parse::<ReconciliationMode>().is_err());
    }

    #[test]
    fn test_state_change_display() {
        let change = StateChange::new("partitions", Some(json!(3)), Some(json!(5)));
        assert_eq!(change.to_string(), "partitions: 3 → 5 (UPDATE)");
    }
}
