//! Attribute comparison for topics

use super::{KafkaTopic, NO_NUM_PARTITIONS, NO_REPLICATION_FACTOR, TopicSpec};
use converge::{Operation, ResourceChange, ResourceChangeFactory, StateChange, compute_map_changes};
use serde_json::json;
use std::collections::BTreeMap;

/// Prefix of the state changes describing topic configs
pub const CONFIG_PREFIX: &str = "config.";

pub const PARTITIONS: &str = "partitions";
pub const REPLICAS: &str = "replicas";

/// Builds topic changes: partitions, replicas and one `config.*` entry per config key
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicChangeFactory {
    delete_orphan_configs: bool,
}

impl TopicChangeFactory {
    /// `delete_orphan_configs` removes configs set on the cluster but absent
    /// from the desired spec
    pub fn new(delete_orphan_configs: bool) -> Self {
        Self { delete_orphan_configs }
    }
}

impl ResourceChangeFactory<String, TopicSpec> for TopicChangeFactory {
    fn create_for_create(&self, key: &String, after: &KafkaTopic) -> ResourceChange {
        let spec = after.spec();
        let mut changes = vec![
            StateChange::new(PARTITIONS, None, Some(json!(spec.partitions_or_default()))),
            StateChange::new(REPLICAS, None, Some(json!(spec.replicas_or_default()))),
        ];
        changes.extend(compute_map_changes(
            CONFIG_PREFIX,
            &BTreeMap::new(),
            &spec.configs,
            false,
        ));
        ResourceChange::new(key, after, Operation::Create, changes)
    }

    fn create_for_update(
        &self,
        key: &String,
        before: &KafkaTopic,
        after: &KafkaTopic,
    ) -> ResourceChange {
        let (observed, desired) = (before.spec(), after.spec());
        let mut changes = vec![
            StateChange::with_sentinel(
                PARTITIONS,
                Some(json!(observed.partitions_or_default())),
                json!(desired.partitions_or_default()),
                &json!(NO_NUM_PARTITIONS),
            ),
            StateChange::with_sentinel(
                REPLICAS,
                Some(json!(observed.replicas_or_default())),
                json!(desired.replicas_or_default()),
                &json!(NO_REPLICATION_FACTOR),
            ),
        ];
        changes.extend(compute_map_changes(
            CONFIG_PREFIX,
            &observed.configs,
            &desired.configs,
            self.delete_orphan_configs,
        ));
        ResourceChange::derived(key, after, changes)
    }

    fn create_for_delete(&self, key: &String, before: &KafkaTopic) -> ResourceChange {
        let spec = before.spec();
        let mut changes = vec![
            StateChange::new(PARTITIONS, Some(json!(spec.partitions_or_default())), None),
            StateChange::new(REPLICAS, Some(json!(spec.replicas_or_default())), None),
        ];
        changes.extend(compute_map_changes(CONFIG_PREFIX, &spec.configs, &BTreeMap::new(), true));
        ResourceChange::new(key, before, Operation::Delete, changes)
    }
}
