//! Resource model for declarative state management
//!
//! A [`Resource`] is an immutable value: `kind`, `api_version`, metadata and
//! a kind-specific `spec`. Every `with_*` method consumes the resource and
//! returns a new one, so a transformation can never mutate the batch it
//! was handed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Annotation marking a desired resource for deletion
pub const ANNOTATION_DELETE: &str = "converge.io/delete";

/// Annotation listing the transformations that modified a resource
pub const ANNOTATION_TRANSFORMED_BY: &str = "converge.io/transformed-by";

/// Name, labels and annotations of a resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Unique within its kind for one reconciliation batch
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A named, typed resource
///
/// # Example
///
/// ```
/// use converge::Resource;
///
/// let topic = Resource::new("KafkaTopic", "kafka.kafkaform.io/v1", "orders", 3u32)
///     .with_label("team", "billing");
/// let clamped = topic.with_spec(2).with_annotation("example.io/clamped", "3");
///
/// assert_eq!(*clamped.spec(), 2);
/// assert_eq!(clamped.annotation("example.io/clamped"), Some("3"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource<S> {
    kind: String,
    api_version: String,
    metadata: ObjectMeta,
    spec: S,
}

impl<S> Resource<S> {
    /// Create a resource without labels or annotations
    pub fn new(
        kind: impl Into<String>,
        api_version: impl Into<String>,
        name: impl Into<String>,
        spec: S,
    ) -> Self {
        Self {
            kind: kind.into(),
            api_version: api_version.into(),
            metadata: ObjectMeta::new(name),
            spec,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    pub fn spec(&self) -> &S {
        &self.spec
    }

    /// Get an annotation value
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }

    /// Get a label value
    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.get(key).map(String::as_str)
    }

    /// Whether the desired resource asks for the observed one to be deleted
    pub fn is_marked_for_deletion(&self) -> bool {
        self.annotation(ANNOTATION_DELETE)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Replace the spec
    pub fn with_spec(self, spec: S) -> Self {
        Self { spec, ..self }
    }

    /// Derive a new spec from the current one
    pub fn map_spec(self, f: impl FnOnce(S) -> S) -> Self {
        Self {
            spec: f(self.spec),
            kind: self.kind,
            api_version: self.api_version,
            metadata: self.metadata,
        }
    }

    /// Add or replace a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    /// Add or replace an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.annotations.insert(key.into(), value.into());
        self
    }

    /// Record that a transformation modified this resource
    ///
    /// Names accumulate in [`ANNOTATION_TRANSFORMED_BY`], comma separated,
    /// in the order the transformations ran.
    pub fn with_provenance(mut self, transformation: &str) -> Self {
        let entry = self
            .metadata
            .annotations
            .entry(ANNOTATION_TRANSFORMED_BY.to_string())
            .or_default();
        if !entry.split(',').any(|n| n == transformation) {
            if !entry.is_empty() {
                entry.push(',');
            }
            entry.push_str(transformation);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource() -> Resource<i32> {
        Resource::new("Counter", "test/v1", "c1", 1)
    }

    #[test]
    fn test_with_spec_keeps_metadata() {
        let r = resource().with_label("env", "prod").with_spec(7);
        assert_eq!(*r.spec(), 7);
        assert_eq!(r.label("env"), Some("prod"));
        assert_eq!(r.kind(), "Counter");
    }

    #[test]
    fn test_marked_for_deletion() {
        assert!(!resource().is_marked_for_deletion());
        assert!(
            resource()
                .with_annotation(ANNOTATION_DELETE, "TRUE")
                .is_marked_for_deletion()
        );
        assert!(
            !resource()
                .with_annotation(ANNOTATION_DELETE, "no")
                .is_marked_for_deletion()
        );
    }

    #[test]
    fn test_provenance_accumulates_once() {
        let r = resource()
            .with_provenance("a")
            .with_provenance("b")
            .with_provenance("a");
        assert_eq!(r.annotation(ANNOTATION_TRANSFORMED_BY), Some("a,b"));
    }

    #[test]
    fn test_serde_camel_case() {
        let json = serde_json::to_value(resource()).unwrap();
        assert_eq!(json["apiVersion"], "test/v1");
        assert_eq!(json["metadata"]["name"], "c1");
    }
}
