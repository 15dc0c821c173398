//! Topic validations

use super::{KIND_TOPIC, KafkaTopic, TopicSpec, require_replication_factor};
use converge::{
    Configurable, Extension, ExtensionConfig, HIGHEST_PRECEDENCE, Validation, ValidationError,
    ValidationResult,
};

/// Longest topic name Kafka accepts
pub const MAX_TOPIC_NAME_LENGTH: usize = 249;

/// Reject names Kafka would refuse
///
/// Legal names are 1 to 249 characters of ASCII letters, digits, `.`, `_`
/// and `-`, and are neither `.` nor `..`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicNameValidation;

impl TopicNameValidation {
    pub const NAME: &'static str = "topic-name";

    fn check(name: &str) -> Option<String> {
        if name.is_empty() {
            return Some("topic name must not be empty".to_string());
        }
        if name == "." || name == ".." {
            return Some(format!("topic name cannot be '{name}'"));
        }
        if name.len() > MAX_TOPIC_NAME_LENGTH {
            return Some(format!(
                "topic name is {} characters long, the maximum is {MAX_TOPIC_NAME_LENGTH}",
                name.len()
            ));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Some(format!("topic name contains illegal character '{c}'"));
        }
        None
    }
}

impl Extension for TopicNameValidation {
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

impl Validation<TopicSpec> for TopicNameValidation {
    fn validate(&self, resources: &[KafkaTopic]) -> ValidationResult {
        resources
            .iter()
            .filter_map(|topic| {
                Self::check(topic.name()).map(|message| {
                    ValidationError::new(self.name(), message).for_resource(topic.name())
                })
            })
            .collect()
    }
}

/// Reject topics with fewer partitions than a minimum
#[derive(Debug, Clone)]
pub struct TopicMinNumPartitions {
    min: i32,
}

impl TopicMinNumPartitions {
    pub const NAME: &'static str = "topic-min-num-partitions";

    pub fn new(min: i32) -> Self {
        Self { min }
    }
}

impl Configurable for TopicMinNumPartitions {
    fn from_config(config: &ExtensionConfig) -> converge::Result<Self> {
        Ok(Self::new(config.require_i32_at_least("min_num_partitions", 1)?))
    }
}

impl Extension for TopicMinNumPartitions {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn accepts(&self, kind: &str) -> bool {
        kind == KIND_TOPIC
    }
}

impl Validation<TopicSpec> for TopicMinNumPartitions {
    fn validate(&self, resources: &[KafkaTopic]) -> ValidationResult {
        resources
            .iter()
            .filter_map(|topic| match topic.spec().partitions {
                Some(p) if p < self.min => Some(
                    ValidationError::new(
                        self.name(),
                        format!("{p} partition(s) is below the minimum of {}", self.min),
                    )
                    .for_resource(topic.name()),
                ),
                _ => None,
            })
            .collect()
    }
}

/// Reject topics with a replication factor above a maximum
#[derive(Debug, Clone)]
pub struct TopicMaxReplicationFactor {
    max: i16,
}

impl TopicMaxReplicationFactor {
    pub const NAME: &'static str = "topic-max-replication-factor";

    pub fn new(max: i16) -> Self {
        Self { max }
    }
}

impl Configurable for TopicMaxReplicationFactor {
    fn from_config(config: &ExtensionConfig) -> converge::Result<Self> {
        Ok(Self::new(require_replication_factor(config, "max_replication_factor")?))
    }
}

impl Extension for TopicMaxReplicationFactor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn accepts(&self, kind: &str) -> bool {
        kind == KIND_TOPIC
    }
}

impl Validation<TopicSpec> for TopicMaxReplicationFactor {
    fn validate(&self, resources: &[KafkaTopic]) -> ValidationResult {
        resources
            .iter()
            .filter_map(|topic| match topic.spec().replicas {
                Some(r) if r > self.max => Some(
                    ValidationError::new(
                        self.name(),
                        format!("replication factor {r} is above the maximum of {}", self.max),
                    )
                    .for_resource(topic.name()),
                ),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::topic;

    fn named(name: &str) -> KafkaTopic {
        topic(name, TopicSpec::new())
    }

    #[test]
    fn test_legal_names() {
        let batch = vec![
            named("orders"),
            named("orders.v2"),
            named("a_b-C.9"),
            named(&"x".repeat(249)),
        ];
        assert!(TopicNameValidation.validate(&batch).is_valid());
    }

    #[test]
    fn test_illegal_names() {
        let batch = vec![
            named(""),
            named("."),
            named(".."),
            named(&"x".repeat(250)),
            named("with space"),
            named("slash/name"),
        ];
        let result = TopicNameValidation.validate(&batch);
        assert_eq!(result.errors().len(), 6);
        assert!(result.errors()[4].message.contains("illegal character ' '"));
    }

    #[test]
    fn test_min_num_partitions() {
        let batch = vec![
            topic("small", TopicSpec::new().with_partitions(1)),
            topic("ok", TopicSpec::new().with_partitions(3)),
            topic("default", TopicSpec::new()),
        ];
        let result = TopicMinNumPartitions::new(3).validate(&batch);
        assert_eq!(result.errors().len(), 1);
        assert_eq!(result.errors()[0].resource.as_deref(), Some("small"));
    }

    #[test]
    fn test_max_replication_factor() {
        let batch = vec![
            topic("wide", TopicSpec::new().with_replicas(5)),
            topic("ok", TopicSpec::new().with_replicas(3)),
        ];
        let result = TopicMaxReplicationFactor::new(3).validate(&batch);
        assert_eq!(result.errors().len(), 1);
        assert_eq!(result.errors()[0].resource.as_deref(), Some("wide"));
    }

    #[test]
    fn test_from_config() {
        let config =
            ExtensionConfig::new(TopicMinNumPartitions::NAME).with("min_num_partitions", "4");
        assert_eq!(TopicMinNumPartitions::from_config(&config).unwrap().min, 4);

        let config =
            ExtensionConfig::new(TopicMaxReplicationFactor::NAME).with("max_replication_factor", 0);
        assert!(TopicMaxReplicationFactor::from_config(&config).is_err());
    }
}
