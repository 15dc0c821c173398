//! Topic transformations

use super::{KIND_TOPIC, KafkaTopic, TopicSpec, require_replication_factor};
use converge::{Configurable, Extension, ExtensionConfig, HIGHEST_PRECEDENCE, Transformation};
use regex::Regex;

/// Annotation recording the partition count before it was clamped
pub const ANNOTATION_ORIGINAL_PARTITIONS: &str = "kafkaform.io/original-partitions";

/// Annotation recording the replication factor before it was raised
pub const ANNOTATION_ORIGINAL_REPLICAS: &str = "kafkaform.io/original-replicas";

/// Clamp the partition count to a maximum
#[derive(Debug, Clone)]
pub struct TopicMaxNumPartitions {
    max: i32,
}

impl TopicMaxNumPartitions {
    pub const NAME: &'static str = "topic-max-num-partitions";

    pub fn new(max: i32) -> Self {
        Self { max }
    }
}

impl Configurable for TopicMaxNumPartitions {
    fn from_config(config: &ExtensionConfig) -> converge::Result<Self> {
        Ok(Self::new(config.require_i32_at_least("max_num_partitions", 1)?))
    }
}

impl Extension for TopicMaxNumPartitions {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn accepts(&self, kind: &str) -> bool {
        kind == KIND_TOPIC
    }

    fn priority(&self) -> i32 {
        100
    }
}

impl Transformation<TopicSpec> for TopicMaxNumPartitions {
    fn transform(&self, resource: KafkaTopic, _batch: &[KafkaTopic]) -> Option<KafkaTopic> {
        let partitions = match resource.spec().partitions {
            Some(p) if p > self.max => p,
            _ => return Some(resource),
        };
        let max = self.max;
        Some(
            resource
                .map_spec(|spec| spec.with_partitions(max))
                .with_annotation(ANNOTATION_ORIGINAL_PARTITIONS, partitions.to_string())
                .with_provenance(self.name()),
        )
    }
}

/// Raise the replication factor to a minimum
#[derive(Debug, Clone)]
pub struct TopicMinReplicationFactor {
    min: i16,
}

impl TopicMinReplicationFactor {
    pub const NAME: &'static str = "topic-min-replication-factor";

    pub fn new(min: i16) -> Self {
        Self { min }
    }
}

impl Configurable for TopicMinReplicationFactor {
    fn from_config(config: &ExtensionConfig) -> converge::Result<Self> {
        Ok(Self::new(require_replication_factor(config, "min_replication_factor")?))
    }
}

impl Extension for TopicMinReplicationFactor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn accepts(&self, kind: &str) -> bool {
        kind == KIND_TOPIC
    }

    fn priority(&self) -> i32 {
        100
    }
}

impl Transformation<TopicSpec> for TopicMinReplicationFactor {
    fn transform(&self, resource: KafkaTopic, _batch: &[KafkaTopic]) -> Option<KafkaTopic> {
        let replicas = match resource.spec().replicas {
            Some(r) if r < self.min => r,
            _ => return Some(resource),
        };
        let min = self.min;
        Some(
            resource
                .map_spec(|spec| spec.with_replicas(min))
                .with_annotation(ANNOTATION_ORIGINAL_REPLICAS, replicas.to_string())
                .with_provenance(self.name()),
        )
    }
}

/// Fill in the replication factor of topics that leave it unset
#[derive(Debug, Clone)]
pub struct TopicDefaultReplicationFactor {
    replicas: i16,
}

impl TopicDefaultReplicationFactor {
    pub const NAME: &'static str = "topic-default-replication-factor";

    pub fn new(replicas: i16) -> Self {
        Self { replicas }
    }
}

impl Configurable for TopicDefaultReplicationFactor {
    fn from_config(config: &ExtensionConfig) -> converge::Result<Self> {
        Ok(Self::new(require_replication_factor(config, "default_replication_factor")?))
    }
}

impl Extension for TopicDefaultReplicationFactor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn accepts(&self, kind: &str) -> bool {
        kind == KIND_TOPIC
    }

    // Before the min/max bounds so they see the filled-in value.
    fn priority(&self) -> i32 {
        50
    }
}

impl Transformation<TopicSpec> for TopicDefaultReplicationFactor {
    fn transform(&self, resource: KafkaTopic, _batch: &[KafkaTopic]) -> Option<KafkaTopic> {
        if resource.spec().replicas.is_some() {
            return Some(resource);
        }
        let replicas = self.replicas;
        Some(
            resource
                .map_spec(|spec| spec.with_replicas(replicas))
                .with_provenance(self.name()),
        )
    }
}

/// Drop topics whose name matches a pattern
///
/// Excluded topics are neither created, updated nor deleted.
#[derive(Debug, Clone)]
pub struct TopicExcludeByName {
    pattern: Regex,
}

impl TopicExcludeByName {
    pub const NAME: &'static str = "topic-exclude-by-name";

    pub fn new(pattern: Regex) -> Self {
        Self { pattern }
    }
}

impl Configurable for TopicExcludeByName {
    fn from_config(config: &ExtensionConfig) -> converge::Result<Self> {
        let raw = config.require_str("pattern")?;
        let pattern = Regex::new(raw).map_err(|e| {
            converge::Error::configuration(config.name(), format!("invalid pattern '{raw}': {e}"))
        })?;
        Ok(Self::new(pattern))
    }
}

impl Extension for TopicExcludeByName {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn accepts(&self, kind: &str) -> bool {
        kind == KIND_TOPIC
    }

    fn priority(&self) -> i32 {
        HIGHEST_PRECEDENCE
    }
}

impl Transformation<TopicSpec> for TopicExcludeByName {
    fn transform(&self, resource: KafkaTopic, _batch: &[KafkaTopic]) -> Option<KafkaTopic> {
        (!self.pattern.is_match(resource.name())).then_some(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::topic;
    use converge::{ANNOTATION_TRANSFORMED_BY, Error, ExtensionRegistry, apply_transformations};

    #[test]
    fn test_max_partitions_clamps_with_annotation() {
        let clamp = TopicMaxNumPartitions::new(5);
        let out = clamp
            .transform(topic("orders", TopicSpec::new().with_partitions(10)), &[])
            .unwrap();

        assert_eq!(out.spec().partitions, Some(5));
        assert_eq!(out.annotation(ANNOTATION_ORIGINAL_PARTITIONS), Some("10"));
        assert_eq!(out.annotation(ANNOTATION_TRANSFORMED_BY), Some(TopicMaxNumPartitions::NAME));
    }

    #[test]
    fn test_max_partitions_leaves_small_and_unset() {
        let clamp = TopicMaxNumPartitions::new(5);
        for spec in [TopicSpec::new().with_partitions(5), TopicSpec::new()] {
            let input = topic("t", spec);
            let out = clamp.transform(input.clone(), &[]).unwrap();
            assert_eq!(out, input);
        }
    }

    #[test]
    fn test_min_replication_factor() {
        let raise = TopicMinReplicationFactor::new(3);
        let out = raise.transform(topic("t", TopicSpec::new().with_replicas(1)), &[]).unwrap();
        assert_eq!(out.spec().replicas, Some(3));
        assert_eq!(out.annotation(ANNOTATION_ORIGINAL_REPLICAS), Some("1"));

        let untouched = raise.transform(topic("t", TopicSpec::new()), &[]).unwrap();
        assert_eq!(untouched.spec().replicas, None);
    }

    #[test]
    fn test_default_then_min_replication_factor() {
        let mut registry = ExtensionRegistry::new();
        registry
            .register_transformation(TopicMinReplicationFactor::new(2))
            .register_transformation(TopicDefaultReplicationFactor::new(1));

        let out =
            apply_transformations(registry.transformations(), vec![topic("t", TopicSpec::new())]);
        assert_eq!(out[0].spec().replicas, Some(2));
        assert_eq!(
            out[0].annotation(ANNOTATION_TRANSFORMED_BY),
            Some("topic-default-replication-factor,topic-min-replication-factor")
        );
    }

    #[test]
    fn test_exclude_by_name() {
        let exclude = TopicExcludeByName::new(Regex::new("^_").unwrap());
        assert!(exclude.transform(topic("_schemas", TopicSpec::new()), &[]).is_none());
        assert!(exclude.transform(topic("orders", TopicSpec::new()), &[]).is_some());
    }

    #[test]
    fn test_from_config() {
        let config =
            ExtensionConfig::new(TopicMaxNumPartitions::NAME).with("max_num_partitions", 50);
        assert_eq!(TopicMaxNumPartitions::from_config(&config).unwrap().max, 50);

        let config = ExtensionConfig::new(TopicMinReplicationFactor::NAME)
            .with("min_replication_factor", 70_000);
        assert!(matches!(
            TopicMinReplicationFactor::from_config(&config),
            Err(Error::Configuration { .. })
        ));

        let config = ExtensionConfig::new(TopicExcludeByName::NAME).with("pattern", "(");
        let err = TopicExcludeByName::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("invalid pattern"));

        let config = ExtensionConfig::new(TopicDefaultReplicationFactor::NAME);
        assert!(TopicDefaultReplicationFactor::from_config(&config).is_err());
    }
}
