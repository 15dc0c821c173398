//! Change computation between observed and desired state
//!
//! [`compute_changes`] is the keyed diff primitive; [`ChangeComputer`] keeps
//! its key extractor and factory around for reuse. [`ResourceChangeComputer`]
//! specializes it for whole resources, delegating attribute comparison to a
//! per-kind [`ResourceChangeFactory`].

use crate::resource::{ObjectMeta, Resource};
use crate::types::{Operation, StateChange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Compute one change per key between two collections
///
/// - keys only in `after` → `factory(key, None, Some(after))`
/// - keys only in `before` → `factory(key, Some(before), None)` when
///   `delete_orphans` is set, skipped otherwise
/// - keys in both → `factory(key, Some(before), Some(after))`
///
/// The factory may return `None` to veto a change. When a collection holds
/// the same key twice the last value wins. Changes are returned sorted by key.
pub fn compute_changes<K, V, C, B, A, KF, CF>(
    before: B,
    after: A,
    key_fn: KF,
    mut factory: CF,
    delete_orphans: bool,
) -> Vec<C>
where
    K: Ord,
    B: IntoIterator<Item = V>,
    A: IntoIterator<Item = V>,
    KF: Fn(&V) -> K,
    CF: FnMut(&K, Option<&V>, Option<&V>) -> Option<C>,
{
    let mut before_by_key: BTreeMap<K, V> = before.into_iter().map(|v| (key_fn(&v), v)).collect();
    let after_by_key: BTreeMap<K, V> = after.into_iter().map(|v| (key_fn(&v), v)).collect();

    let mut keyed: Vec<(K, C)> = Vec::with_capacity(after_by_key.len());

    for (key, after_value) in after_by_key {
        let before_value = before_by_key.remove(&key);
        if let Some(change) = factory(&key, before_value.as_ref(), Some(&after_value)) {
            keyed.push((key, change));
        }
    }

    if delete_orphans {
        for (key, before_value) in before_by_key {
            if let Some(change) = factory(&key, Some(&before_value), None) {
                keyed.push((key, change));
            }
        }
    }

    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, change)| change).collect()
}

type KeyFn<K, V> = Box<dyn Fn(&V) -> K + Send + Sync>;
type FactoryFn<K, V, C> = Box<dyn Fn(&K, Option<&V>, Option<&V>) -> Option<C> + Send + Sync>;

/// Reusable keyed diff: a key extractor, a change factory and an orphan policy
///
/// # Example
///
/// ```
/// use converge::ChangeComputer;
///
/// let computer = ChangeComputer::new(
///     |v: &(String, u32)| v.0.clone(),
///     |key: &String, before: Option<&(String, u32)>, after: Option<&(String, u32)>| {
///         Some(format!("{key}: {:?} -> {:?}", before.map(|b| b.1), after.map(|a| a.1)))
///     },
/// );
///
/// let before = vec![("a".to_string(), 1)];
/// let after = vec![("a".to_string(), 2), ("b".to_string(), 3)];
/// let changes = computer.compute_changes(&before, &after);
/// assert_eq!(changes, vec!["a: Some(1) -> Some(2)", "b: None -> Some(3)"]);
/// ```
pub struct ChangeComputer<K, V, C> {
    key_fn: KeyFn<K, V>,
    factory: FactoryFn<K, V, C>,
    delete_orphans: bool,
}

impl<K: Ord, V, C> ChangeComputer<K, V, C> {
    /// Create a computer that leaves orphans untouched
    pub fn new(
        key_fn: impl Fn(&V) -> K + Send + Sync + 'static,
        factory: impl Fn(&K, Option<&V>, Option<&V>) -> Option<C> + Send + Sync + 'static,
    ) -> Self {
        Self {
            key_fn: Box::new(key_fn),
            factory: Box::new(factory),
            delete_orphans: false,
        }
    }

    /// Set the orphan policy
    pub fn delete_orphans(mut self, delete_orphans: bool) -> Self {
        self.delete_orphans = delete_orphans;
        self
    }

    /// Compute changes between two collections
    pub fn compute_changes<'a>(
        &self,
        before: impl IntoIterator<Item = &'a V>,
        after: impl IntoIterator<Item = &'a V>,
    ) -> Vec<C>
    where
        V: 'a,
    {
        compute_changes(
            before,
            after,
            |v: &&V| (self.key_fn)(v),
            |key, b: Option<&&V>, a: Option<&&V>| (self.factory)(key, b.copied(), a.copied()),
            self.delete_orphans,
        )
    }
}

/// Computed change for one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceChange {
    kind: String,
    api_version: String,
    key: String,
    metadata: ObjectMeta,
    operation: Operation,
    changes: Vec<StateChange>,
}

impl ResourceChange {
    /// Create a change with an explicit operation (create/delete)
    pub fn new<S>(
        key: impl fmt::Display,
        resource: &Resource<S>,
        operation: Operation,
        changes: Vec<StateChange>,
    ) -> Self {
        Self {
            kind: resource.kind().to_string(),
            api_version: resource.api_version().to_string(),
            key: key.to_string(),
            metadata: resource.metadata().clone(),
            operation,
            changes,
        }
    }

    /// Create an update candidate whose operation is derived from `changes`
    pub fn derived<S>(
        key: impl fmt::Display,
        resource: &Resource<S>,
        changes: Vec<StateChange>,
    ) -> Self {
        let operation = Operation::from_changes(&changes);
        Self::new(key, resource, operation, changes)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Key the change was computed under
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn changes(&self) -> &[StateChange] {
        &self.changes
    }

    /// Find an attribute change by name
    pub fn change(&self, name: &str) -> Option<&StateChange> {
        self.changes.iter().find(|c| c.name() == name)
    }

    /// Attribute changes whose name starts with `prefix`, prefix stripped
    pub fn changes_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a StateChange)> + 'a {
        self.changes
            .iter()
            .filter_map(move |c| c.name().strip_prefix(prefix).map(|n| (n, c)))
    }
}

impl fmt::Display for ResourceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.operation, self.kind, self.key)?;
        for change in self.changes.iter().filter(|c| c.operation().is_change()) {
            write!(f, "\n  {change}")?;
        }
        Ok(())
    }
}

/// Per-kind attribute comparison
pub trait ResourceChangeFactory<K, S>: Send + Sync {
    /// Change for a resource that only exists in the desired state
    fn create_for_create(&self, key: &K, after: &Resource<S>) -> ResourceChange;

    /// Change for a resource present on both sides
    fn create_for_update(&self, key: &K, before: &Resource<S>, after: &Resource<S>)
    -> ResourceChange;

    /// Change for a resource that must be removed
    fn create_for_delete(&self, key: &K, before: &Resource<S>) -> ResourceChange;
}

impl<K, S, F> ResourceChangeFactory<K, S> for Arc<F>
where
    F: ResourceChangeFactory<K, S> + ?Sized,
{
    fn create_for_create(&self, key: &K, after: &Resource<S>) -> ResourceChange {
        (**self).create_for_create(key, after)
    }

    fn create_for_update(
        &self,
        key: &K,
        before: &Resource<S>,
        after: &Resource<S>,
    ) -> ResourceChange {
        (**self).create_for_update(key, before, after)
    }

    fn create_for_delete(&self, key: &K, before: &Resource<S>) -> ResourceChange {
        (**self).create_for_delete(key, before)
    }
}

/// Keyed diff over whole resources
pub struct ResourceChangeComputer<K, S, F> {
    key_fn: KeyFn<K, Resource<S>>,
    factory: F,
    delete_orphans: bool,
}

impl<S: 'static, F> ResourceChangeComputer<String, S, F>
where
    F: ResourceChangeFactory<String, S>,
{
    /// Key resources by metadata name
    pub fn by_name(factory: F) -> Self {
        Self::new(|r: &Resource<S>| r.name().to_string(), factory)
    }
}

impl<K, S, F> ResourceChangeComputer<K, S, F>
where
    K: Ord,
    F: ResourceChangeFactory<K, S>,
{
    pub fn new(key_fn: impl Fn(&Resource<S>) -> K + Send + Sync + 'static, factory: F) -> Self {
        Self {
            key_fn: Box::new(key_fn),
            factory,
            delete_orphans: false,
        }
    }

    /// Set the orphan policy
    pub fn delete_orphans(mut self, delete_orphans: bool) -> Self {
        self.delete_orphans = delete_orphans;
        self
    }

    /// Compute resource changes from observed (`before`) to desired (`after`)
    ///
    /// A desired resource marked for deletion becomes a delete of its
    /// observed counterpart, and is ignored when there is none.
    pub fn compute_changes(
        &self,
        before: &[Resource<S>],
        after: &[Resource<S>],
    ) -> Vec<ResourceChange> {
        compute_changes(
            before,
            after,
            |r: &&Resource<S>| (self.key_fn)(r),
            |key, b: Option<&&Resource<S>>, a: Option<&&Resource<S>>| match (b, a) {
                (None, Some(a)) if a.is_marked_for_deletion() => None,
                (None, Some(a)) => Some(self.factory.create_for_create(key, a)),
                (Some(b), Some(a)) if a.is_marked_for_deletion() => {
                    Some(self.factory.create_for_delete(key, b))
                }
                (Some(b), Some(a)) => Some(self.factory.create_for_update(key, b, a)),
                (Some(b), None) => Some(self.factory.create_for_delete(key, b)),
                (None, None) => None,
            },
            self.delete_orphans,
        )
    }
}

/// One entry of a nested key/value map
pub trait MapEntry {
    /// Value recorded in the state change
    fn value(&self) -> serde_json::Value;

    /// Whether an orphaned entry may be removed
    fn is_deletable(&self) -> bool {
        true
    }
}

/// Compute attribute changes for a nested map (e.g. configuration entries)
///
/// Each entry becomes a [`StateChange`] named `{prefix}{key}`. Orphaned
/// entries become deletes only when `delete_orphans` is set and the entry
/// is deletable; a non-deletable orphan never produces a change.
pub fn compute_map_changes<V: MapEntry>(
    prefix: &str,
    before: &BTreeMap<String, V>,
    after: &BTreeMap<String, V>,
    delete_orphans: bool,
) -> Vec<StateChange> {
    compute_changes(
        before,
        after,
        |entry: &(&String, &V)| entry.0.clone(),
        |key, b, a| match (b, a) {
            (Some((_, b)), None) if !b.is_deletable() => None,
            _ => Some(StateChange::new(
                format!("{prefix}{key}"),
                b.map(|(_, v)| v.value()),
                a.map(|(_, v)| v.value()),
            )),
        },
        delete_orphans,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        value: i64,
        deletable: bool,
    }

    impl MapEntry for Entry {
        fn value(&self) -> serde_json::Value {
            json!(self.value)
        }

        fn is_deletable(&self) -> bool {
            self.deletable
        }
    }

    fn entries(items: &[(&str, i64, bool)]) -> BTreeMap<String, Entry> {
        items
            .iter()
            .map(|(k, v, d)| {
                (
                    (*k).to_string(),
                    Entry {
                        value: *v,
                        deletable: *d,
                    },
                )
            })
            .collect()
    }

    fn op_diff(
        before: &[(&str, i32)],
        after: &[(&str, i32)],
        delete_orphans: bool,
    ) -> Vec<(String, Operation)> {
        compute_changes(
            before.iter().copied(),
            after.iter().copied(),
            |v: &(&str, i32)| v.0.to_string(),
            |key, b, a| {
                let op = match (b, a) {
                    (None, Some(_)) => Operation::Create,
                    (Some(_), None) => Operation::Delete,
                    (Some(b), Some(a)) if b.1 == a.1 => Operation::None,
                    _ => Operation::Update,
                };
                Some((key.clone(), op))
            },
            delete_orphans,
        )
    }

    #[test]
    fn test_create_detection() {
        let changes = op_diff(&[], &[("a", 1), ("b", 2)], false);
        assert_eq!(
            changes,
            vec![
                ("a".to_string(), Operation::Create),
                ("b".to_string(), Operation::Create)
            ]
        );
    }

    #[test]
    fn test_orphans_skipped_unless_enabled() {
        let kept = op_diff(&[("a", 1), ("b", 2)], &[("a", 1)], false);
        assert_eq!(kept, vec![("a".to_string(), Operation::None)]);

        let deleted = op_diff(&[("a", 1), ("b", 2)], &[("a", 1)], true);
        assert_eq!(
            deleted,
            vec![
                ("a".to_string(), Operation::None),
                ("b".to_string(), Operation::Delete)
            ]
        );
    }

    #[test]
    fn test_identical_collections_yield_no_changes() {
        let same = [("a", 1), ("b", 2), ("c", 3)];
        let changes = op_diff(&same, &same, true);
        assert_eq!(changes.len(), 3);
        assert!(changes.iter().all(|(_, op)| *op == Operation::None));
    }

    #[test]
    fn test_output_sorted_by_key() {
        let changes = op_diff(&[("z", 1), ("m", 1)], &[("b", 1), ("y", 2)], true);
        let keys: Vec<_> = changes.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "m", "y", "z"]);
    }

    #[test]
    fn test_factory_veto() {
        let changes: Vec<String> = compute_changes(
            vec!["keep", "protected"],
            Vec::<&str>::new(),
            |v: &&str| v.to_string(),
            |key, _, _| (key != "protected").then(|| key.clone()),
            true,
        );
        assert_eq!(changes, vec!["keep".to_string()]);
    }

    #[test]
    fn test_change_computer_reuse() {
        let computer = ChangeComputer::new(
            |v: &(String, i32)| v.0.clone(),
            |_: &String, b: Option<&(String, i32)>, a: Option<&(String, i32)>| {
                Some(StateChange::new("v", b.map(|b| json!(b.1)), a.map(|a| json!(a.1))))
            },
        )
        .delete_orphans(true);

        let before = vec![("x".to_string(), 1)];
        let after = vec![("x".to_string(), 2)];
        let first = computer.compute_changes(&before, &after);
        let second = computer.compute_changes(&after, &after);
        assert_eq!(first[0].operation(), Operation::Update);
        assert_eq!(second[0].operation(), Operation::None);
    }

    #[test]
    fn test_map_changes_non_deletable_veto() {
        let before = entries(&[("retention.ms", 1000, true), ("segment.bytes", 10, false)]);
        let after = entries(&[]);

        for delete_orphans in [true, false] {
            let changes = compute_map_changes("config.", &before, &after, delete_orphans);
            assert!(
                changes.iter().all(|c| c.name() != "config.segment.bytes"),
                "non-deletable entry must never be deleted"
            );
        }

        let changes = compute_map_changes("config.", &before, &after, true);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].name(), "config.retention.ms");
        assert_eq!(changes[0].operation(), Operation::Delete);
    }

    #[test]
    fn test_map_changes_update_and_create() {
        let before = entries(&[("a", 1, true)]);
        let after = entries(&[("a", 2, true), ("b", 3, true)]);
        let changes = compute_map_changes("config.", &before, &after, false);
        assert_eq!(changes[0].name(), "config.a");
        assert_eq!(changes[0].operation(), Operation::Update);
        assert_eq!(changes[1].name(), "config.b");
        assert_eq!(changes[1].operation(), Operation::Create);
    }

    struct CounterFactory;

    impl ResourceChangeFactory<String, i64> for CounterFactory {
        fn create_for_create(&self, key: &String, after: &Resource<i64>) -> ResourceChange {
            let changes = vec![StateChange::new("value", None, Some(json!(after.spec())))];
            ResourceChange::new(key, after, Operation::Create, changes)
        }

        fn create_for_update(
            &self,
            key: &String,
            before: &Resource<i64>,
            after: &Resource<i64>,
        ) -> ResourceChange {
            let changes = vec![StateChange::new(
                "value",
                Some(json!(before.spec())),
                Some(json!(after.spec())),
            )];
            ResourceChange::derived(key, after, changes)
        }

        fn create_for_delete(&self, key: &String, before: &Resource<i64>) -> ResourceChange {
            let changes = vec![StateChange::new("value", Some(json!(before.spec())), None)];
            ResourceChange::new(key, before, Operation::Delete, changes)
        }
    }

    fn counter(name: &str, value: i64) -> Resource<i64> {
        Resource::new("Counter", "test/v1", name, value)
    }

    #[test]
    fn test_resource_change_computer() {
        let before = vec![counter("a", 1), counter("b", 2), counter("gone", 9)];
        let after = vec![counter("a", 1), counter("b", 5), counter("new", 3)];

        let changes =
            ResourceChangeComputer::by_name(CounterFactory).compute_changes(&before, &after);
        let ops: Vec<_> = changes.iter().map(|c| (c.key(), c.operation())).collect();
        assert_eq!(
            ops,
            vec![
                ("a", Operation::None),
                ("b", Operation::Update),
                ("new", Operation::Create)
            ]
        );

        let changes = ResourceChangeComputer::by_name(CounterFactory)
            .delete_orphans(true)
            .compute_changes(&before, &after);
        assert_eq!(changes.len(), 4);
        let gone = changes.iter().find(|c| c.key() == "gone");
        assert_eq!(gone.map(ResourceChange::operation), Some(Operation::Delete));
    }

    #[test]
    fn test_delete_annotation() {
        let before = vec![counter("a", 1)];
        let after = vec![
            counter("a", 1).with_annotation(crate::resource::ANNOTATION_DELETE, "true"),
            counter("never-existed", 1).with_annotation(crate::resource::ANNOTATION_DELETE, "true"),
        ];
        let changes =
            ResourceChangeComputer::by_name(CounterFactory).compute_changes(&before, &after);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key(), "a");
        assert_eq!(changes[0].operation(), Operation::Delete);
    }

    #[test]
    fn test_changes_with_prefix() {
        let change = ResourceChange::derived(
            "t",
            &counter("t", 1),
            vec![
                StateChange::new("partitions", Some(json!(1)), Some(json!(2))),
                StateChange::new("config.retention.ms", None, Some(json!("10"))),
            ],
        );
        let configs: Vec<_> = change.changes_with_prefix("config.").map(|(n, _)| n).collect();
        assert_eq!(configs, vec!["retention.ms"]);
    }
}
