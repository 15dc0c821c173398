//! The `KafkaTopic` resource kind
//!
//! A topic spec carries an optional partition count, an optional
//! replication factor and a map of topic configs. Unset numbers mean "use
//! the broker default" and are compared as the `-1` sentinel.

pub mod change;
pub mod controller;
pub mod handler;
pub mod transform;
pub mod validation;

use crate::admin::AdminClientContext;
use crate::config::Config;
use converge::{Configurable, ExtensionConfig, ExtensionRegistry, MapEntry, Resource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use change::TopicChangeFactory;
pub use controller::TopicController;
pub use handler::{CreateTopicHandler, DeleteTopicHandler, UpdateTopicHandler};
pub use transform::{
    TopicDefaultReplicationFactor, TopicExcludeByName, TopicMaxNumPartitions,
    TopicMinReplicationFactor,
};
pub use validation::{TopicMaxReplicationFactor, TopicMinNumPartitions, TopicNameValidation};

pub const KIND_TOPIC: &str = "KafkaTopic";
pub const API_VERSION: &str = "kafka.kafkaform.io/v1";

/// Partition count meaning "broker default"
pub const NO_NUM_PARTITIONS: i32 = -1;

/// Replication factor meaning "broker default"
pub const NO_REPLICATION_FACTOR: i16 = -1;

/// A `KafkaTopic` resource
pub type KafkaTopic = Resource<TopicSpec>;

/// Desired or observed state of one topic
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i16>,
    #[serde(default)]
    pub configs: BTreeMap<String, ConfigValue>,
}

impl TopicSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partitions(mut self, partitions: i32) -> Self {
        self.partitions = Some(partitions);
        self
    }

    pub fn with_replicas(mut self, replicas: i16) -> Self {
        self.replicas = Some(replicas);
        self
    }

    /// Add a deletable config entry
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.configs.insert(key.into(), ConfigValue::new(value));
        self
    }

    /// Partition count, or [`NO_NUM_PARTITIONS`] when unset
    pub fn partitions_or_default(&self) -> i32 {
        self.partitions.unwrap_or(NO_NUM_PARTITIONS)
    }

    /// Replication factor, or [`NO_REPLICATION_FACTOR`] when unset
    pub fn replicas_or_default(&self) -> i16 {
        self.replicas.unwrap_or(NO_REPLICATION_FACTOR)
    }
}

/// A topic config value
///
/// A non-deletable entry is never removed from the cluster, even when it
/// disappears from the desired state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValue {
    pub value: String,
    #[serde(default = "default_deletable")]
    pub deletable: bool,
}

fn default_deletable() -> bool {
    true
}

impl ConfigValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            deletable: true,
        }
    }

    pub fn protected(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            deletable: false,
        }
    }
}

impl MapEntry for ConfigValue {
    fn value(&self) -> serde_json::Value {
        serde_json::Value::String(self.value.clone())
    }

    fn is_deletable(&self) -> bool {
        self.deletable
    }
}

/// Required replication-factor parameter: a positive `i16`
pub(crate) fn require_replication_factor(
    config: &ExtensionConfig,
    key: &str,
) -> converge::Result<i16> {
    let value = config.require_i32_at_least(key, 1)?;
    i16::try_from(value).map_err(|_| {
        converge::Error::configuration(
            config.name(),
            format!("parameter '{key}' must be an integer between 1 and {}", i16::MAX),
        )
    })
}

/// Build a `KafkaTopic` resource
pub fn topic(name: impl Into<String>, spec: TopicSpec) -> KafkaTopic {
    Resource::new(KIND_TOPIC, API_VERSION, name, spec)
}

/// Register everything the `KafkaTopic` kind needs
///
/// Configurable extensions are registered only when the configuration has
/// a table for them; the topic-name validation is always registered. Every
/// extension honors the `enabled` and `priority` keys of its table.
pub fn register_topic_extensions(
    registry: &mut ExtensionRegistry<TopicSpec>,
    config: &Config,
    context: &Arc<AdminClientContext>,
) -> converge::Result<()> {
    registry.register_change_factory(
        KIND_TOPIC,
        TopicChangeFactory::new(config.reconcile.delete_orphan_configs),
    );

    if config.has_extension(TopicExcludeByName::NAME) {
        let ext = config.extension(TopicExcludeByName::NAME)?;
        registry.register_transformation_with(TopicExcludeByName::from_config(&ext)?, &ext)?;
    }
    if config.has_extension(TopicDefaultReplicationFactor::NAME) {
        let ext = config.extension(TopicDefaultReplicationFactor::NAME)?;
        registry
            .register_transformation_with(TopicDefaultReplicationFactor::from_config(&ext)?, &ext)?;
    }
    if config.has_extension(TopicMaxNumPartitions::NAME) {
        let ext = config.extension(TopicMaxNumPartitions::NAME)?;
        registry.register_transformation_with(TopicMaxNumPartitions::from_config(&ext)?, &ext)?;
    }
    if config.has_extension(TopicMinReplicationFactor::NAME) {
        let ext = config.extension(TopicMinReplicationFactor::NAME)?;
        registry.register_transformation_with(TopicMinReplicationFactor::from_config(&ext)?, &ext)?;
    }

    let ext = config.extension(TopicNameValidation::NAME)?;
    registry.register_validation_with(TopicNameValidation, &ext)?;
    if config.has_extension(TopicMinNumPartitions::NAME) {
        let ext = config.extension(TopicMinNumPartitions::NAME)?;
        registry.register_validation_with(TopicMinNumPartitions::from_config(&ext)?, &ext)?;
    }
    if config.has_extension(TopicMaxReplicationFactor::NAME) {
        let ext = config.extension(TopicMaxReplicationFactor::NAME)?;
        registry.register_validation_with(TopicMaxReplicationFactor::from_config(&ext)?, &ext)?;
    }

    registry
        .register_handler(KIND_TOPIC, CreateTopicHandler::new(Arc::clone(context)))
        .register_handler(KIND_TOPIC, UpdateTopicHandler::new(Arc::clone(context)))
        .register_handler(KIND_TOPIC, DeleteTopicHandler::new(Arc::clone(context)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::admin_client_context;
    use crate::admin::memory::InMemoryAdminClient;
    use converge::{Error, Operation};

    fn context() -> Arc<AdminClientContext> {
        let config = Config::default();
        Arc::new(admin_client_context(
            Arc::new(InMemoryAdminClient::new(1)),
            &config.client,
        ))
    }

    #[test]
    fn test_spec_serde() {
        let json = serde_json::json!({
            "partitions": 3,
            "configs": {
                "retention.ms": {"value": "1000"},
                "cleanup.policy": {"value": "compact", "deletable": false}
            }
        });
        let spec: TopicSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.partitions, Some(3));
        assert_eq!(spec.replicas_or_default(), NO_REPLICATION_FACTOR);
        assert!(spec.configs["retention.ms"].deletable);
        assert!(!spec.configs["cleanup.policy"].deletable);
    }

    #[test]
    fn test_registration_follows_config() {
        let config = Config::from_toml_str(
            r#"
[extensions.topic-max-num-partitions]
max_num_partitions = 5

[extensions.topic-exclude-by-name]
enabled = false
pattern = "^_"
"#,
        )
        .unwrap();

        let mut registry = ExtensionRegistry::new();
        register_topic_extensions(&mut registry, &config, &context()).unwrap();

        let transformations: Vec<_> = registry
            .transformations()
            .iter()
            .map(|t| t.extension.name().to_string())
            .collect();
        assert_eq!(transformations, vec![TopicMaxNumPartitions::NAME]);
        assert_eq!(registry.validations().len(), 1);
        assert!(registry.change_factory(KIND_TOPIC).is_some());
        for operation in [Operation::Create, Operation::Update, Operation::Delete] {
            assert!(registry.handler(KIND_TOPIC, operation).is_some());
        }
    }

    #[test]
    fn test_missing_parameter_is_configuration_error() {
        let config =
            Config::from_toml_str("[extensions.topic-max-num-partitions]\npriority = 1\n").unwrap();
        let mut registry = ExtensionRegistry::new();
        let err = register_topic_extensions(&mut registry, &config, &context()).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("max_num_partitions"));
    }
}
